/// Utility for building the contents of a `task.sh` script file.
/// Note that it modifies a String reference held internally;
/// read that String to get the script's contents.
#[derive(Debug)]
pub struct TaskScriptBuilder<'a> {
    strbuf: &'a mut String,
}

impl<'a> TaskScriptBuilder<'a> {
    pub fn new(strbuf: &'a mut String) -> Self {
        Self { strbuf }
    }
}

impl TaskScriptBuilder<'_> {
    /// shebang line and bash option
    pub fn write_prefix(&mut self) {
        self.strbuf.clear();
        self.strbuf.push_str("#!/usr/bin/env bash\nset -xeuo pipefail\n\n");
    }

    /// a single variable assignment, single-quoted
    pub fn write_assignment_line(&mut self, var_name: &str, var_val: &str) {
        self.strbuf.push_str(var_name);
        self.strbuf.push('=');
        self.strbuf.push('\'');
        self.strbuf.push_str(&var_val.replace('\'', r"'\''"));
        self.strbuf.push('\'');
        self.strbuf.push('\n');
    }

    /// cd to the task dir, execute code, and exit.
    pub fn write_normal_task_suffix(&mut self, task_dir: &str, code: &str) {
        self.write_cd(task_dir);
        self.write_code(code);
        self.write_exit();
    }

    fn write_cd(&mut self, task_dir: &str) {
        self.strbuf.push_str("\ncd '");
        self.strbuf.push_str(task_dir);
        self.strbuf.push_str("'\n\n");
    }

    fn write_code(&mut self, code: &str) {
        self.strbuf.push_str(code.trim_end());
        self.strbuf.push('\n');
    }

    fn write_exit(&mut self) {
        self.strbuf.push_str("\nexit 0\n");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_script() {
        let mut strbuf = String::new();
        let mut script = TaskScriptBuilder::new(&mut strbuf);
        script.write_prefix();
        script.write_assignment_line("in_file", "/data/sub-01/anat/it's.nii.gz");
        script.write_assignment_line("frac", "");
        script.write_normal_task_suffix("/work/bet", "bet \"$in_file\" brain.nii.gz\n");
        assert_eq!(
            "#!/usr/bin/env bash\nset -xeuo pipefail\n\n\
             in_file='/data/sub-01/anat/it'\\''s.nii.gz'\n\
             frac=''\n\
             \ncd '/work/bet'\n\n\
             bet \"$in_file\" brain.nii.gz\n\
             \nexit 0\n",
            strbuf
        );
    }
}
