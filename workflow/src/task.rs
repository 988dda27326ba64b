use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{Direction, Error, Value, Values};

/// In-process computation for a `Payload::Function` task.
pub type TaskFn = Arc<dyn Fn(&Values) -> anyhow::Result<Values> + Send + Sync>;

/// Default memory estimate for a single task, in GB.
pub const DEFAULT_MEM_GB: f64 = 0.2;

/// What a task does when it runs.
#[derive(Clone)]
pub enum Payload {
    /// Forward each input to the output of the same name.
    Identity,
    /// Bash snippet run in the task's output dir.
    /// Inputs and outputs are exposed to it as environment variables.
    Command { code: String },
    /// In-process computation.
    Function(TaskFn),
    /// Persist every connected input under a stable location.
    Sink(SinkSpec),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Command { code } => f.debug_struct("Command").field("code", code).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Sink(spec) => f.debug_tuple("Sink").field(spec).finish(),
        }
    }
}

/// Where a sink writes, and how destination paths are rewritten.
#[derive(Debug, Clone, Default)]
pub struct SinkSpec {
    pub base_dir: PathBuf,
    /// (regex, replacement) pairs, applied in order to each destination path.
    pub substitutions: Vec<(String, String)>,
}

/// A slot whose values fan out into one task instance each.
#[derive(Debug, Clone, PartialEq)]
pub struct Iterable {
    pub slot: String,
    pub values: Vec<Value>,
}

/// An external tool a task depends on, recorded in the dataset description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub version: Option<String>,
}

/// A named unit of work with named input and output slots.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// file names of command outputs, relative to the output dir
    output_files: BTreeMap<String, String>,
    pub payload: Payload,
    /// statically bound input values
    pub values: Values,
    pub iterable: Option<Iterable>,
    pub mem_gb: f64,
    pub tool: Option<Tool>,
}

impl Task {
    fn new(name: &str, payload: Payload) -> Self {
        Self {
            name: name.to_owned(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            output_files: BTreeMap::new(),
            payload,
            values: Values::new(),
            iterable: None,
            mem_gb: DEFAULT_MEM_GB,
            tool: None,
        }
    }

    /// Passthrough task exposing `fields` as both inputs and outputs.
    pub fn identity(name: &str, fields: &[&str]) -> Self {
        let mut task = Self::new(name, Payload::Identity);
        task.inputs = fields.iter().map(|f| f.to_string()).collect();
        task.outputs = task.inputs.clone();
        task
    }

    /// Bash task. Declare its slots with `input` and `output`.
    pub fn command(name: &str, code: &str) -> Self {
        Self::new(
            name,
            Payload::Command {
                code: code.to_owned(),
            },
        )
    }

    /// In-process task.
    pub fn function<F>(name: &str, inputs: &[&str], outputs: &[&str], f: F) -> Self
    where
        F: Fn(&Values) -> anyhow::Result<Values> + Send + Sync + 'static,
    {
        let mut task = Self::new(name, Payload::Function(Arc::new(f)));
        task.inputs = inputs.iter().map(|s| s.to_string()).collect();
        task.outputs = outputs.iter().map(|s| s.to_string()).collect();
        task
    }

    /// Result sink. Accepts any input slot.
    pub fn sink(name: &str, spec: SinkSpec) -> Self {
        Self::new(name, Payload::Sink(spec))
    }

    pub fn input(mut self, slot: &str) -> Self {
        self.inputs.push(slot.to_owned());
        self
    }

    /// Declare an output slot whose value is `file`, relative to the output dir.
    pub fn output(mut self, slot: &str, file: &str) -> Self {
        self.outputs.push(slot.to_owned());
        self.output_files.insert(slot.to_owned(), file.to_owned());
        self
    }

    /// Bind a static value to an input slot.
    pub fn with_value(mut self, slot: &str, value: impl Into<Value>) -> Self {
        self.values.insert(slot.to_owned(), value.into());
        self
    }

    pub fn iterate(mut self, slot: &str, values: Vec<Value>) -> Self {
        self.iterable = Some(Iterable {
            slot: slot.to_owned(),
            values,
        });
        self
    }

    pub fn mem_gb(mut self, mem_gb: f64) -> Self {
        self.mem_gb = mem_gb;
        self
    }

    pub fn tool(mut self, name: &str, version: Option<&str>) -> Self {
        self.tool = Some(Tool {
            name: name.to_owned(),
            version: version.map(str::to_owned),
        });
        self
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn output_files(&self) -> &BTreeMap<String, String> {
        &self.output_files
    }

    pub fn is_sink(&self) -> bool {
        matches!(self.payload, Payload::Sink(_))
    }

    pub fn is_command(&self) -> bool {
        matches!(self.payload, Payload::Command { .. })
    }

    pub fn has_input(&self, slot: &str) -> bool {
        self.is_sink() || self.inputs.iter().any(|s| s == slot)
    }

    pub fn has_output(&self, slot: &str) -> bool {
        self.outputs.iter().any(|s| s == slot)
    }

    pub fn has_slot(&self, slot: &str, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.has_input(slot),
            Direction::Output => self.has_output(slot),
        }
    }

    /// Checks that everything bound to this task refers to one of its own slots.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let bound = self.values.keys().chain(self.iterable.iter().map(|it| &it.slot));
        for slot in bound {
            if !self.has_input(slot) {
                return Err(Error::SlotNotFound {
                    node: self.name.clone(),
                    slot: slot.clone(),
                    direction: Direction::Input,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{SinkSpec, Task};
    use crate::Value;

    #[test]
    fn test_command_slots() {
        let task = Task::command("bet", "bet \"$in_file\" \"$out_file\"")
            .input("in_file")
            .output("out_file", "brain.nii.gz");
        assert!(task.has_input("in_file"));
        assert!(!task.has_input("out_file"));
        assert!(task.has_output("out_file"));
        assert_eq!(
            Some("brain.nii.gz"),
            task.output_files().get("out_file").map(String::as_str)
        );
    }

    #[test]
    fn test_sink_accepts_any_input() {
        let sink = Task::sink("sinker", SinkSpec::default());
        assert!(sink.is_sink());
        assert!(sink.has_input("bet.@brain"));
        assert!(sink.outputs().is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_bound_slot() {
        let ok = Task::identity("it", &["subject"]).iterate("subject", vec![Value::from("01")]);
        assert!(ok.validate().is_ok());
        let bad = Task::identity("it", &["subject"]).with_value("session", "1");
        assert!(bad.validate().is_err());
    }
}
