use std::fmt;
use std::path::PathBuf;

use util::{HashMap, IdVec};

use crate::{Config, Direction, Error, NodeId, Task, Value};

/// Name of the passthrough task exposing a graph's inputs.
pub const INPUTSPEC: &str = "inputspec";
/// Name of the passthrough task exposing a graph's outputs.
pub const OUTPUTSPEC: &str = "outputspec";
/// Name of a graph's result sink.
pub const SINKER: &str = "sinker";

/// Separates nested node names, e.g. "anat_proc.bet".
pub const PATH_DELIM: char = '.';

const NO_FIELDS: &[String] = &[];

/// A node in a graph is either a leaf task or a nested graph.
#[derive(Debug, Clone)]
pub enum Node {
    Task(Task),
    Graph(Workflow),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Self::Task(task) => &task.name,
            Self::Graph(wf) => wf.name(),
        }
    }

    /// The slots this node exposes to its enclosing graph.
    pub fn boundary(&self) -> Boundary<'_> {
        match self {
            Self::Task(task) => Boundary {
                inputs: if task.is_sink() {
                    None
                } else {
                    Some(task.inputs())
                },
                outputs: task.outputs(),
            },
            Self::Graph(wf) => wf.boundary(),
        }
    }
}

/// Declared input and output slots of a node.
/// `inputs: None` means any input slot is accepted (result sinks).
#[derive(Debug, Clone, Copy)]
pub struct Boundary<'a> {
    pub inputs: Option<&'a [String]>,
    pub outputs: &'a [String],
}

impl Boundary<'_> {
    pub fn has(&self, slot: &str, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.inputs.map_or(true, |s| s.iter().any(|x| x == slot)),
            Direction::Output => self.outputs.iter().any(|x| x == slot),
        }
    }
}

/// Fully resolved endpoint of an edge, relative to the node it belongs to:
/// `path` names the nested nodes to descend through, `slot` the leaf slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub path: Vec<String>,
    pub slot: String,
}

impl SlotRef {
    pub fn direct(slot: &str) -> Self {
        Self {
            path: Vec::new(),
            slot: slot.to_owned(),
        }
    }

    fn prefixed(mut self, node: &str) -> Self {
        self.path.insert(0, node.to_owned());
        self
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.path {
            write!(f, "{node}{PATH_DELIM}")?;
        }
        f.write_str(&self.slot)
    }
}

/// A directed connection from an output slot to an input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub src: NodeId,
    pub src_slot: SlotRef,
    pub dst: NodeId,
    pub dst_slot: SlotRef,
}

/// Either end of a connection, given by id or by name.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Id(NodeId),
    Name(&'a str),
}

impl From<NodeId> for NodeRef<'_> {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a str> for NodeRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for NodeRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

/// A named, nestable DAG of tasks and edges.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    nodes: IdVec<NodeId, Node>,
    names: HashMap<String, NodeId>,
    edges: Vec<Edge>,
    inputspec: Option<NodeId>,
    outputspec: Option<NodeId>,
    sink: Option<NodeId>,
    /// working directory root; a temp dir is used when unset
    pub base_dir: Option<PathBuf>,
    pub sink_dir: Option<PathBuf>,
    pub qc_dir: Option<PathBuf>,
    config: Config,
}

impl Workflow {
    /// Create an empty graph holding its own copy of `config`.
    pub fn new(name: &str, config: Config) -> Self {
        Self {
            name: name.to_owned(),
            nodes: IdVec::with_capacity(16),
            names: HashMap::default(),
            edges: Vec::with_capacity(16),
            inputspec: None,
            outputspec: None,
            sink: None,
            base_dir: None,
            sink_dir: None,
            qc_dir: None,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Changes made here stay local to this graph.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn inputspec(&self) -> Option<NodeId> {
        self.inputspec
    }

    pub fn outputspec(&self) -> Option<NodeId> {
        self.outputspec
    }

    pub fn sink(&self) -> Option<NodeId> {
        self.sink
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.enumerate()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a direct child by name.
    pub fn get_node(&self, name: &str) -> Result<NodeId, Error> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(name.to_owned(), self.name.clone()))
    }

    /// Look up a leaf task by dotted path, e.g. "anat_proc.bet".
    pub fn find_task(&self, path: &str) -> Result<&Task, Error> {
        let (head, rest) = match path.split_once(PATH_DELIM) {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.node(self.get_node(head)?), rest) {
            (Node::Task(task), None) => Ok(task),
            (Node::Graph(wf), Some(rest)) => wf.find_task(rest),
            _ => Err(Error::NodeNotFound(path.to_owned(), self.name.clone())),
        }
    }

    /// The slots of this graph's `inputspec`/`outputspec`, empty when absent.
    pub fn boundary(&self) -> Boundary<'_> {
        let fields = |id: Option<NodeId>| match id.map(|id| self.node(id)) {
            Some(Node::Task(task)) => task.outputs(),
            _ => NO_FIELDS,
        };
        Boundary {
            inputs: Some(fields(self.inputspec)),
            outputs: fields(self.outputspec),
        }
    }

    pub fn add_task(&mut self, task: Task) -> Result<NodeId, Error> {
        task.validate()?;
        self.add_node(Node::Task(task))
    }

    /// Nest `wf` in this graph; it can then be connected like a single task.
    pub fn add_graph(&mut self, wf: Workflow) -> Result<NodeId, Error> {
        self.add_node(Node::Graph(wf))
    }

    /// Create the `inputspec` passthrough exposing `fields`.
    pub fn set_inputspec(&mut self, fields: &[&str]) -> Result<NodeId, Error> {
        let id = self.add_task(Task::identity(INPUTSPEC, fields))?;
        self.inputspec = Some(id);
        Ok(id)
    }

    /// Create the `outputspec` passthrough exposing `fields`.
    pub fn set_outputspec(&mut self, fields: &[&str]) -> Result<NodeId, Error> {
        let id = self.add_task(Task::identity(OUTPUTSPEC, fields))?;
        self.outputspec = Some(id);
        Ok(id)
    }

    /// Add `task` and mark it as this graph's result sink.
    pub fn set_sink(&mut self, task: Task) -> Result<NodeId, Error> {
        let id = self.add_task(task)?;
        self.sink = Some(id);
        Ok(id)
    }

    fn add_node(&mut self, node: Node) -> Result<NodeId, Error> {
        let name = node.name();
        if name.is_empty() || name.contains(PATH_DELIM) {
            return Err(Error::InvalidNodeName(name.to_owned()));
        }
        if self.names.contains_key(name) {
            return Err(Error::DuplicateNode(self.name.clone(), name.to_owned()));
        }
        let name = name.to_owned();
        log::trace!("adding node {name} to {}", self.name);
        let id = self.nodes.push(node);
        self.names.insert(name, id);
        Ok(id)
    }
}

// CONNECTING ///////////////
impl Workflow {
    /// Connect `src_slot` of `src` to `dst_slot` of `dst`.
    ///
    /// A bare slot on a nested graph resolves against that graph's boundary,
    /// i.e. to `outputspec.<slot>` on the source side and `inputspec.<slot>` on
    /// the destination side. A dotted slot ("child.slot") names a path
    /// into the nested graph explicitly.
    pub fn connect<'a, 'b>(
        &mut self,
        src: impl Into<NodeRef<'a>>,
        src_slot: &str,
        dst: impl Into<NodeRef<'b>>,
        dst_slot: &str,
    ) -> Result<(), Error> {
        let src = self.resolve_ref(src.into())?;
        let dst = self.resolve_ref(dst.into())?;
        self.connect_ids(src, src_slot, dst, dst_slot)
    }

    /// Connect several (src_slot, dst_slot) pairs between the same two nodes.
    pub fn connect_many<'a, 'b>(
        &mut self,
        src: impl Into<NodeRef<'a>>,
        dst: impl Into<NodeRef<'b>>,
        slots: &[(&str, &str)],
    ) -> Result<(), Error> {
        let src = self.resolve_ref(src.into())?;
        let dst = self.resolve_ref(dst.into())?;
        if slots.is_empty() {
            return Err(Error::EmptyConnection(
                self.node(src).name().to_owned(),
                self.node(dst).name().to_owned(),
            ));
        }
        for (src_slot, dst_slot) in slots {
            self.connect_ids(src, src_slot, dst, dst_slot)?;
        }
        Ok(())
    }

    /// Connect several node pairs at once, as `(src, dst, slots)` groups
    /// each handled by [`Workflow::connect_many`]. Stops at the first error.
    pub fn connect_groups(
        &mut self,
        groups: &[(&str, &str, &[(&str, &str)])],
    ) -> Result<(), Error> {
        for (src, dst, slots) in groups {
            self.connect_many(*src, *dst, slots)?;
        }
        Ok(())
    }

    /// Bind a static value to an input, resolved the same way as `connect`.
    pub fn set_input<'a>(
        &mut self,
        node: impl Into<NodeRef<'a>>,
        slot: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let id = self.resolve_ref(node.into())?;
        let slot_ref = self.resolve_slot(id, slot, Direction::Input)?;
        let task = self.task_at_mut(id, &slot_ref.path)?;
        task.values.insert(slot_ref.slot, value.into());
        Ok(())
    }

    fn connect_ids(
        &mut self,
        src: NodeId,
        src_slot: &str,
        dst: NodeId,
        dst_slot: &str,
    ) -> Result<(), Error> {
        if src == dst {
            return Err(Error::SelfConnection(self.node(src).name().to_owned()));
        }
        let src_slot = self.resolve_slot(src, src_slot, Direction::Output)?;
        let dst_slot = self.resolve_slot(dst, dst_slot, Direction::Input)?;

        if self.edges.iter().any(|e| e.dst == dst && e.dst_slot == dst_slot) {
            return Err(Error::InputAlreadyConnected(
                self.node(dst).name().to_owned(),
                dst_slot.to_string(),
            ));
        }

        log::debug!(
            "{}: connecting {}.{} -> {}.{}",
            self.name,
            self.node(src).name(),
            src_slot,
            self.node(dst).name(),
            dst_slot,
        );
        self.edges.push(Edge {
            src,
            src_slot,
            dst,
            dst_slot,
        });
        Ok(())
    }

    fn resolve_ref(&self, node: NodeRef) -> Result<NodeId, Error> {
        match node {
            NodeRef::Id(id) if usize::from(id) < self.nodes.len() => Ok(id),
            NodeRef::Id(id) => Err(Error::NodeNotFound(format!("#{id}"), self.name.clone())),
            NodeRef::Name(name) => self.get_node(name),
        }
    }

    /// Resolve `slot` on node `id` to a concrete slot reference.
    pub fn resolve_slot(
        &self,
        id: NodeId,
        slot: &str,
        direction: Direction,
    ) -> Result<SlotRef, Error> {
        let not_found = |node: &str| Error::SlotNotFound {
            node: node.to_owned(),
            slot: slot.to_owned(),
            direction,
        };
        match self.node(id) {
            Node::Task(task) if task.has_slot(slot, direction) => Ok(SlotRef::direct(slot)),
            Node::Task(task) => Err(not_found(&task.name)),
            Node::Graph(wf) => {
                if let Some((child, rest)) = slot.split_once(PATH_DELIM) {
                    let child_id = wf.get_node(child)?;
                    Ok(wf.resolve_slot(child_id, rest, direction)?.prefixed(child))
                } else if wf.boundary().has(slot, direction) {
                    let passthrough = match direction {
                        Direction::Input => INPUTSPEC,
                        Direction::Output => OUTPUTSPEC,
                    };
                    Ok(SlotRef::direct(slot).prefixed(passthrough))
                } else {
                    Err(not_found(wf.name()))
                }
            }
        }
    }

    fn task_at_mut(&mut self, id: NodeId, path: &[String]) -> Result<&mut Task, Error> {
        let wf_name = self.name.clone();
        match (self.nodes.get_mut(id), path.split_first()) {
            (Node::Task(task), None) => Ok(task),
            (Node::Graph(wf), Some((child, rest))) => {
                let child_id = wf.get_node(child)?;
                wf.task_at_mut(child_id, rest)
            }
            (node, _) => Err(Error::NodeNotFound(node.name().to_owned(), wf_name)),
        }
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;

    use super::*;

    fn copy_task(name: &str) -> Task {
        Task::command(name, "cp \"$in_file\" \"$out_file\"")
            .input("in_file")
            .output("out_file", "out.txt")
    }

    fn nested(name: &str) -> Result<Workflow> {
        let mut wf = Workflow::new(name, Config::default());
        wf.set_inputspec(&["y"])?;
        wf.set_outputspec(&["out"])?;
        wf.add_task(copy_task("inner"))?;
        wf.connect(INPUTSPEC, "y", "inner", "in_file")?;
        wf.connect("inner", "out_file", OUTPUTSPEC, "out")?;
        Ok(wf)
    }

    #[test]
    fn test_connect_leaf_tasks() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        let a = wf.add_task(copy_task("a"))?;
        wf.add_task(copy_task("b"))?;
        wf.connect(a, "out_file", "b", "in_file")?;
        assert_eq!(1, wf.edges().len());
        assert_eq!(SlotRef::direct("in_file"), wf.edges()[0].dst_slot);
        Ok(())
    }

    #[test]
    fn test_bare_slot_rewrites_to_passthrough() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        wf.add_graph(nested("sub")?)?;
        wf.add_task(copy_task("after"))?;
        wf.connect("sub", "out", "after", "in_file")?;
        assert_eq!("outputspec.out", wf.edges()[0].src_slot.to_string());
        Ok(())
    }

    #[test]
    fn test_rewrite_is_idempotent() -> Result<()> {
        let mut bare = Workflow::new("top", Config::default());
        bare.add_task(copy_task("A"))?;
        bare.add_graph(nested("B")?)?;
        bare.connect("A", "out_file", "B", "y")?;

        let mut explicit = Workflow::new("top", Config::default());
        explicit.add_task(copy_task("A"))?;
        explicit.add_graph(nested("B")?)?;
        explicit.connect("A", "out_file", "B", "inputspec.y")?;

        assert_eq!(bare.edges(), explicit.edges());
        assert_eq!("inputspec.y", bare.edges()[0].dst_slot.to_string());
        Ok(())
    }

    #[test]
    fn test_graph_literal_slot_needs_explicit_path() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        wf.add_graph(nested("sub")?)?;
        wf.add_task(copy_task("after"))?;
        // "out_file" is only an output of sub.inner, not of sub's boundary:
        let err = wf.connect("sub", "out_file", "after", "in_file").unwrap_err();
        assert!(matches!(err, Error::SlotNotFound { ref node, .. } if node == "sub"));
        wf.connect("sub", "inner.out_file", "after", "in_file")?;
        assert_eq!("inner.out_file", wf.edges()[0].src_slot.to_string());
        Ok(())
    }

    #[test]
    fn test_connection_errors() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        wf.add_task(copy_task("a"))?;
        wf.add_task(copy_task("b"))?;
        assert!(matches!(
            wf.connect("missing", "out_file", "b", "in_file"),
            Err(Error::NodeNotFound(..))
        ));
        assert!(matches!(
            wf.connect("a", "nope", "b", "in_file"),
            Err(Error::SlotNotFound { direction: Direction::Output, .. })
        ));
        assert!(matches!(
            wf.connect("a", "out_file", "a", "in_file"),
            Err(Error::SelfConnection(..))
        ));
        assert!(matches!(
            wf.connect_many("a", "b", &[]),
            Err(Error::EmptyConnection(..))
        ));
        wf.connect("a", "out_file", "b", "in_file")?;
        assert!(matches!(
            wf.connect("a", "out_file", "b", "in_file"),
            Err(Error::InputAlreadyConnected(..))
        ));
        Ok(())
    }

    #[test]
    fn test_connect_groups() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        wf.set_inputspec(&["x"])?;
        wf.add_task(copy_task("a"))?;
        wf.add_task(copy_task("b"))?;
        wf.connect_groups(&[
            (INPUTSPEC, "a", &[("x", "in_file")]),
            ("a", "b", &[("out_file", "in_file")]),
        ])?;
        assert_eq!(2, wf.edges().len());
        assert_eq!("in_file", wf.edges()[1].dst_slot.to_string());

        assert!(matches!(
            wf.connect_groups(&[("b", "a", &[])]),
            Err(Error::EmptyConnection(..))
        ));
        Ok(())
    }

    #[test]
    fn test_duplicate_and_invalid_names() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        wf.set_inputspec(&["x"])?;
        assert!(matches!(
            wf.add_task(Task::identity(INPUTSPEC, &["y"])),
            Err(Error::DuplicateNode(..))
        ));
        assert!(matches!(
            wf.add_task(copy_task("a.b")),
            Err(Error::InvalidNodeName(..))
        ));
        Ok(())
    }

    #[test]
    fn test_set_input_descends_into_graph() -> Result<()> {
        let mut wf = Workflow::new("top", Config::default());
        wf.add_graph(nested("sub")?)?;
        wf.set_input("sub", "y", std::path::PathBuf::from("/data/t1.nii.gz"))?;
        let inputspec = wf.find_task("sub.inputspec")?;
        assert_eq!(
            Some(&Value::from(std::path::PathBuf::from("/data/t1.nii.gz"))),
            inputspec.values.get("y")
        );
        Ok(())
    }

    #[test]
    fn test_sink_accepts_dotted_slot() -> Result<()> {
        let mut wf = nested("stage")?;
        wf.set_sink(Task::sink(SINKER, Default::default()))?;
        wf.connect(OUTPUTSPEC, "out", SINKER, "stage.@out")?;
        let last = wf.edges().last().map(|e| e.dst_slot.to_string());
        assert_eq!(Some("stage.@out".to_owned()), last);
        Ok(())
    }
}
