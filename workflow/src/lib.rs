mod value;
pub use value::{Value, Values};

mod task;
pub use task::{Iterable, Payload, SinkSpec, Task, TaskFn, Tool, DEFAULT_MEM_GB};

mod id;
pub use id::NodeId;

mod workflow;
pub use workflow::{
    Boundary, Edge, Node, NodeRef, SlotRef, Workflow, INPUTSPEC, OUTPUTSPEC, PATH_DELIM, SINKER,
};

mod config;
pub use config::{Config, Section};

mod param;
pub use param::Parameterization;

mod output_dir;
pub use output_dir::{parameterization_dir, resolve_output_dir, temp_base_dir, MAX_SEGMENT_LEN};

/// Which side of a task a slot is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No node named \"{0}\" in workflow \"{1}\"")]
    NodeNotFound(String, String),
    #[error("Node \"{node}\" has no {direction} slot \"{slot}\"")]
    SlotNotFound {
        node: String,
        slot: String,
        direction: Direction,
    },
    #[error("Workflow \"{0}\" already has a node named \"{1}\"")]
    DuplicateNode(String, String),
    #[error("Invalid node name \"{0}\": names must be non-empty and must not contain '.'")]
    InvalidNodeName(String),
    #[error("Input \"{1}\" of node \"{0}\" is already connected")]
    InputAlreadyConnected(String, String),
    #[error("Connection from \"{0}\" to \"{1}\" lists no slots")]
    EmptyConnection(String, String),
    #[error("Node \"{0}\" cannot be connected to itself")]
    SelfConnection(String),
    #[error("Missing setting [{section}] {key}, and no fallback is defined")]
    MissingConfig { section: String, key: String },
    #[error("Invalid setting [{section}] {key} = \"{value}\": expected {expected}")]
    InvalidConfigValue {
        section: String,
        key: String,
        value: String,
        expected: &'static str,
    },
}
