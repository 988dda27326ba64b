use anyhow::Result;

use util::{HashMap, IdVec};
use workflow::{Node, SlotRef, Task, Workflow, PATH_DELIM};

use crate::{Error, LeafId};

/// A task at any nesting depth.
#[derive(Debug)]
pub struct Leaf<'a> {
    pub task: &'a Task,
    /// dotted names of the enclosing graphs, outermost first
    pub hierarchy: String,
    /// `hierarchy` plus the task's own name
    pub path: String,
}

/// An edge between two leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEdge {
    pub src: LeafId,
    pub src_slot: String,
    pub dst: LeafId,
    pub dst_slot: String,
}

/// Collect all leaves of `wf` and rewrite its edges (and those of every
/// nested graph) to connect leaves directly.
pub fn flatten(wf: &Workflow) -> Result<(IdVec<LeafId, Leaf<'_>>, Vec<LeafEdge>)> {
    let mut flattener = Flattener::default();
    flattener.visit(wf, "");

    let mut edges = Vec::with_capacity(flattener.pending.len());
    for (src, src_slot, dst, dst_slot) in flattener.pending {
        edges.push(LeafEdge {
            src: lookup(&flattener.by_path, &src)?,
            src_slot,
            dst: lookup(&flattener.by_path, &dst)?,
            dst_slot,
        });
    }
    log::debug!(
        "flattened {} into {} leaves and {} edges",
        wf.name(),
        flattener.leaves.len(),
        edges.len()
    );
    Ok((flattener.leaves, edges))
}

fn lookup(by_path: &HashMap<String, LeafId>, path: &str) -> Result<LeafId, Error> {
    by_path
        .get(path)
        .copied()
        .ok_or_else(|| Error::UnknownLeaf(path.to_owned()))
}

/// (src leaf path, src slot, dst leaf path, dst slot)
type PendingEdge = (String, String, String, String);

#[derive(Default)]
struct Flattener<'a> {
    leaves: IdVec<LeafId, Leaf<'a>>,
    by_path: HashMap<String, LeafId>,
    pending: Vec<PendingEdge>,
}

impl<'a> Flattener<'a> {
    fn visit(&mut self, wf: &'a Workflow, hierarchy: &str) {
        let here = join(hierarchy, wf.name());
        for (_, node) in wf.nodes() {
            match node {
                Node::Task(task) => {
                    let path = join(&here, &task.name);
                    let id = self.leaves.push(Leaf {
                        task,
                        hierarchy: here.clone(),
                        path: path.clone(),
                    });
                    self.by_path.insert(path, id);
                }
                Node::Graph(child) => self.visit(child, &here),
            }
        }
        for edge in wf.edges() {
            let (src, src_slot) = leaf_path(&here, wf.node(edge.src), &edge.src_slot);
            let (dst, dst_slot) = leaf_path(&here, wf.node(edge.dst), &edge.dst_slot);
            self.pending.push((src, src_slot, dst, dst_slot));
        }
    }
}

/// Full dotted path of the leaf an edge endpoint lands on, and the slot on that leaf.
fn leaf_path(here: &str, node: &Node, slot: &SlotRef) -> (String, String) {
    let mut path = join(here, node.name());
    for child in &slot.path {
        path.push(PATH_DELIM);
        path.push_str(child);
    }
    (path, slot.slot.clone())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}{PATH_DELIM}{name}")
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use workflow::{Config, Task, Workflow, INPUTSPEC, OUTPUTSPEC};

    use super::flatten;

    fn copy_task(name: &str) -> Task {
        Task::command(name, "cp \"$in_file\" \"$out_file\"")
            .input("in_file")
            .output("out_file", "out.txt")
    }

    #[test]
    fn test_flatten_nested() -> Result<()> {
        let mut inner = Workflow::new("stage", Config::default());
        inner.set_inputspec(&["in_file"])?;
        inner.set_outputspec(&["out_file"])?;
        inner.add_task(copy_task("copy"))?;
        inner.connect(INPUTSPEC, "in_file", "copy", "in_file")?;
        inner.connect("copy", "out_file", OUTPUTSPEC, "out_file")?;

        let mut top = Workflow::new("top", Config::default());
        top.add_task(copy_task("first"))?;
        top.add_graph(inner)?;
        top.connect("first", "out_file", "stage", "in_file")?;

        let (leaves, edges) = flatten(&top)?;
        let paths: Vec<&str> = leaves.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(
            vec!["top.first", "top.stage.inputspec", "top.stage.outputspec", "top.stage.copy"],
            paths
        );
        assert_eq!("top.stage", leaves.iter().nth(3).map(|l| l.hierarchy.as_str()).unwrap());

        assert_eq!(3, edges.len());
        let top_edge = edges.last().unwrap();
        assert_eq!("top.first", leaves.get(top_edge.src).path);
        assert_eq!("top.stage.inputspec", leaves.get(top_edge.dst).path);
        assert_eq!("in_file", top_edge.dst_slot);
        Ok(())
    }
}
