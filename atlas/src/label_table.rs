use std::path::Path;

use anyhow::{Context, Result};

use crate::Error;

/// Conventional file name of the label table.
pub const LABEL_TABLE: &str = "newlabels.tsv";

/// Write a tab-separated `index  name  module` table, with index starting at 1.
pub fn write_label_table(path: &Path, labels: &[String], modules: &[String]) -> Result<()> {
    if labels.len() != modules.len() {
        return Err(Error::LengthMismatch(labels.len(), modules.len()).into());
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("while creating label table {:?}", path))?;

    writer.write_record(["index", "name", "module"])?;
    for (i, (label, module)) in labels.iter().zip(modules).enumerate() {
        let index = (i + 1).to_string();
        writer.write_record([index.as_str(), label.as_str(), module.as_str()])?;
    }
    writer.flush()?;

    log::debug!("wrote {} labels to {:?}", labels.len(), path);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_label_table() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(LABEL_TABLE);
        let labels = vec!["precuneus".to_owned(), "V1".to_owned()];
        let modules = vec!["DMN".to_owned(), "VIS".to_owned()];
        write_label_table(&path, &labels, &modules)?;

        let text = std::fs::read_to_string(&path)?;
        assert_eq!("index\tname\tmodule\n1\tprecuneus\tDMN\n2\tV1\tVIS\n", text);
        Ok(())
    }
}
