use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use colored::Colorize;

use util::IdVec;
use workflow::{resolve_output_dir, temp_base_dir, Parameterization, Task, Workflow};

use crate::flatten::{flatten, Leaf, LeafEdge};
use crate::{Error, InstanceId, LeafId};

/// Where one input of an instance comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    pub slot: String,
    pub src: InstanceId,
    pub src_slot: String,
}

/// One concrete run of a leaf task under a specific parameterization.
#[derive(Debug)]
pub struct Instance<'a> {
    pub leaf: LeafId,
    pub task: &'a Task,
    /// dotted names of enclosing graphs, outermost first
    pub hierarchy: String,
    /// `hierarchy` plus task name
    pub path: String,
    pub params: Parameterization,
    pub inputs: Vec<InputSource>,
    /// distinct instances feeding `inputs`
    pub dependencies: Vec<InstanceId>,
    output_dir: OnceLock<PathBuf>,
}

impl Instance<'_> {
    /// Uniquely identifies this instance in ui messages.
    pub fn print_id(&self) -> String {
        if self.params.is_empty() {
            self.path.clone()
        } else {
            format!("{}[{}]", self.path, self.params)
        }
    }
}

/// All instances of a workflow, in dependency order.
#[derive(Debug)]
pub struct Traversal<'a> {
    pub instances: IdVec<InstanceId, Instance<'a>>,
    dependents: IdVec<InstanceId, Vec<InstanceId>>,
    base_dir: PathBuf,
    parameterize_dirs: bool,
}

impl<'a> Traversal<'a> {
    /// Flatten `wf`, check it for cycles, and expand its iterables.
    pub fn create(wf: &'a Workflow) -> Result<Self> {
        let (leaves, edges) = flatten(wf)?;
        let order = topological_order(&leaves, &edges)?;

        let base_dir = match &wf.base_dir {
            Some(dir) => dir.clone(),
            None => temp_base_dir()?,
        };
        let parameterize_dirs = wf.config().parameterize_dirs()?;

        let mut instances: IdVec<InstanceId, Instance> = IdVec::with_capacity(leaves.len());
        let mut by_leaf: IdVec<LeafId, Vec<InstanceId>> = IdVec::fill(Vec::new(), leaves.len());

        for leaf_id in order {
            let leaf = leaves.get(leaf_id);
            let incoming: Vec<&LeafEdge> = edges.iter().filter(|e| e.dst == leaf_id).collect();

            for params in expand(leaf, &incoming, &instances, &by_leaf) {
                let mut inputs = Vec::with_capacity(incoming.len());
                let mut dependencies = Vec::with_capacity(incoming.len());
                for edge in &incoming {
                    let src = by_leaf
                        .get(edge.src)
                        .iter()
                        .copied()
                        .find(|&id| instances.get(id).params.is_compatible(&params))
                        .ok_or_else(|| {
                            Error::NoCompatibleSource(
                                leaves.get(edge.src).path.clone(),
                                params.to_string(),
                            )
                        })?;
                    inputs.push(InputSource {
                        slot: edge.dst_slot.clone(),
                        src,
                        src_slot: edge.src_slot.clone(),
                    });
                    if !dependencies.contains(&src) {
                        dependencies.push(src);
                    }
                }

                let id = instances.push(Instance {
                    leaf: leaf_id,
                    task: leaf.task,
                    hierarchy: leaf.hierarchy.clone(),
                    path: leaf.path.clone(),
                    params,
                    inputs,
                    dependencies,
                    output_dir: OnceLock::new(),
                });
                by_leaf.get_mut(leaf_id).push(id);
            }
        }

        let mut dependents = IdVec::fill(Vec::new(), instances.len());
        for (id, instance) in instances.enumerate() {
            for dep in &instance.dependencies {
                dependents.get_mut(*dep).push(id);
            }
        }

        log::debug!("traversal has {} instances", instances.len());
        for instance in instances.iter() {
            log::trace!("{}", instance.print_id().cyan());
        }

        Ok(Self {
            instances,
            dependents,
            base_dir,
            parameterize_dirs,
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, id: InstanceId) -> &Instance<'a> {
        self.instances.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + use<'a> {
        self.instances.ids()
    }

    pub fn dependents(&self, id: InstanceId) -> &[InstanceId] {
        self.dependents.get(id)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// If true, long parameterization segments are not hashed.
    pub fn parameterize_dirs(&self) -> bool {
        self.parameterize_dirs
    }

    /// Working dir of an instance. Computed on first use, then cached.
    pub fn output_dir(&self, id: InstanceId) -> Result<&Path> {
        let instance = self.instances.get(id);
        if let Some(dir) = instance.output_dir.get() {
            return Ok(dir);
        }
        let dir = resolve_output_dir(
            instance.task,
            &instance.hierarchy,
            &instance.params,
            Some(&self.base_dir),
            self.parameterize_dirs,
        )
        .with_context(|| format!("while resolving output dir of {}", instance.print_id()))?;
        Ok(instance.output_dir.get_or_init(|| dir))
    }

    /// All instances of the leaf at `path` (e.g. "wf.stage_b").
    pub fn find(&self, path: &str) -> impl Iterator<Item = InstanceId> + '_ {
        let path = path.to_owned();
        self.instances
            .enumerate()
            .filter(move |(_, instance)| instance.path == path)
            .map(|(id, _)| id)
    }
}

/// Parameterizations for the instances of `leaf`: one per compatible combination
/// of upstream instances, times each value of the leaf's own iterable.
fn expand(
    leaf: &Leaf,
    incoming: &[&LeafEdge],
    instances: &IdVec<InstanceId, Instance>,
    by_leaf: &IdVec<LeafId, Vec<InstanceId>>,
) -> Vec<Parameterization> {
    let mut combos = vec![Parameterization::new()];

    let mut sources: Vec<LeafId> = Vec::with_capacity(incoming.len());
    for edge in incoming {
        if !sources.contains(&edge.src) {
            sources.push(edge.src);
        }
    }

    for src in sources {
        let mut next = Vec::with_capacity(combos.len());
        for params in &combos {
            for &id in by_leaf.get(src) {
                let upstream = &instances.get(id).params;
                if upstream.is_compatible(params) {
                    let mut merged = params.clone();
                    merged.merge(upstream);
                    if !next.contains(&merged) {
                        next.push(merged);
                    }
                }
            }
        }
        combos = next;
    }

    if let Some(iterable) = &leaf.task.iterable {
        let mut next = Vec::with_capacity(combos.len() * iterable.values.len());
        for params in &combos {
            for value in &iterable.values {
                let mut bound = params.clone();
                bound.push(&iterable.slot, value.clone());
                next.push(bound);
            }
        }
        combos = next;
    }

    combos
}

/// Kahn's algorithm over the leaves; fails on a cycle.
fn topological_order(leaves: &IdVec<LeafId, Leaf>, edges: &[LeafEdge]) -> Result<Vec<LeafId>> {
    let mut in_degree: IdVec<LeafId, usize> = IdVec::fill(0, leaves.len());
    let mut downstream: IdVec<LeafId, Vec<LeafId>> = IdVec::fill(Vec::new(), leaves.len());
    for edge in edges {
        *in_degree.get_mut(edge.dst) += 1;
        downstream.get_mut(edge.src).push(edge.dst);
    }

    let mut queue: VecDeque<LeafId> = leaves.ids().filter(|&id| *in_degree.get(id) == 0).collect();
    let mut order = Vec::with_capacity(leaves.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for &next in downstream.get(id) {
            let degree = in_degree.get_mut(next);
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < leaves.len() {
        let stuck: Vec<&str> = leaves
            .enumerate()
            .filter(|(id, _)| *in_degree.get(*id) > 0)
            .map(|(_, leaf)| leaf.path.as_str())
            .collect();
        return Err(Error::Cycle(stuck.join(", ")).into());
    }
    Ok(order)
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use tempfile::tempdir;
    use workflow::{Config, Task, Value, Workflow, INPUTSPEC, OUTPUTSPEC};

    use super::Traversal;
    use crate::Error;

    fn copy_task(name: &str) -> Task {
        Task::command(name, "cp \"$in_file\" \"$out_file\"")
            .input("in_file")
            .output("out_file", "out.txt")
    }

    fn subjects(ids: &[&str]) -> Vec<Value> {
        ids.iter().map(|&s| Value::from(s)).collect()
    }

    #[test]
    fn test_iterables_fan_out_downstream() -> Result<()> {
        let base = tempdir()?;
        let mut wf = Workflow::new("wf", Config::default());
        wf.base_dir = Some(base.path().to_path_buf());
        wf.add_task(
            Task::identity("subject_iterator", &["subject"])
                .iterate("subject", subjects(&["01", "02"])),
        )?;
        wf.add_task(Task::command("grab", "echo").input("subject").output("out_file", "x"))?;
        wf.add_task(copy_task("process"))?;
        wf.add_task(Task::identity("unrelated", &["x"]))?;
        wf.connect("subject_iterator", "subject", "grab", "subject")?;
        wf.connect("grab", "out_file", "process", "in_file")?;

        let traversal = Traversal::create(&wf)?;
        assert_eq!(2, traversal.find("wf.subject_iterator").count());
        assert_eq!(2, traversal.find("wf.process").count());
        assert_eq!(1, traversal.find("wf.unrelated").count());

        for id in traversal.find("wf.process") {
            let process = traversal.get(id);
            let grab = traversal.get(process.inputs[0].src);
            assert_eq!(process.params, grab.params);
            assert_eq!(vec![process.inputs[0].src], process.dependencies);
        }

        let dirs: Vec<_> = traversal
            .find("wf.process")
            .map(|id| traversal.output_dir(id).map(|p| p.to_path_buf()))
            .collect::<Result<_>>()?;
        let root = base.path().canonicalize()?;
        assert_eq!(root.join("wf/_subject_01/process"), dirs[0]);
        assert_eq!(root.join("wf/_subject_02/process"), dirs[1]);
        Ok(())
    }

    #[test]
    fn test_independent_iterables_multiply() -> Result<()> {
        let mut wf = Workflow::new("wf", Config::default());
        wf.add_task(
            Task::identity("subjects", &["subject"]).iterate("subject", subjects(&["01", "02"])),
        )?;
        wf.add_task(
            Task::identity("runs", &["run"])
                .iterate("run", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        )?;
        wf.add_task(Task::command("join", "true").input("subject").input("run"))?;
        wf.connect("subjects", "subject", "join", "subject")?;
        wf.connect("runs", "run", "join", "run")?;
        let traversal = Traversal::create(&wf)?;
        assert_eq!(6, traversal.find("wf.join").count());
        Ok(())
    }

    #[test]
    fn test_order_respects_edges() -> Result<()> {
        let mut wf = Workflow::new("wf", Config::default());
        let b = wf.add_task(copy_task("b"))?;
        let a = wf.add_task(copy_task("a"))?;
        wf.connect(a, "out_file", b, "in_file")?;
        let traversal = Traversal::create(&wf)?;
        let paths: Vec<&str> = traversal.instances.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(vec!["wf.a", "wf.b"], paths);
        let a_id = traversal.find("wf.a").next().unwrap();
        assert_eq!(1, traversal.dependents(a_id).len());
        Ok(())
    }

    #[test]
    fn test_cycle_through_nested_graph() -> Result<()> {
        let mut inner = Workflow::new("inner", Config::default());
        inner.set_inputspec(&["x"])?;
        inner.set_outputspec(&["y"])?;
        inner.connect(INPUTSPEC, "x", OUTPUTSPEC, "y")?;

        let mut wf = Workflow::new("wf", Config::default());
        wf.add_graph(inner)?;
        wf.add_task(copy_task("loop"))?;
        wf.connect("inner", "y", "loop", "in_file")?;
        wf.connect("loop", "out_file", "inner", "x")?;

        let err = Traversal::create(&wf).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Cycle(_))), "{err}");
        Ok(())
    }

    #[test]
    fn test_output_dir_is_memoized() -> Result<()> {
        let base = tempdir()?;
        let mut wf = Workflow::new("wf", Config::default());
        wf.base_dir = Some(base.path().to_path_buf());
        wf.add_task(copy_task("a"))?;
        let traversal = Traversal::create(&wf)?;
        let id = traversal.find("wf.a").next().unwrap();
        let first = traversal.output_dir(id)? as *const std::path::Path;
        let second = traversal.output_dir(id)? as *const std::path::Path;
        assert_eq!(first, second);
        Ok(())
    }
}
