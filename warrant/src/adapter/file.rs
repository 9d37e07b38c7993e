//! The CSV-like file adapter, plus its filtered variant.

use std::io::Write;
use std::path::PathBuf;

use crate::error::AdapterError;
use crate::model::Model;

use super::{load_policy_fields, load_policy_line, parse_policy_line, Adapter, Filter};

/// Loads rules from a text file, one rule per line, and saves the whole
/// store back. Single-rule auto-save operations are not implemented.
pub struct FileAdapter {
    file_path: PathBuf,
}

impl FileAdapter {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    fn check_path(&self) -> Result<(), AdapterError> {
        if self.file_path.as_os_str().is_empty() {
            return Err(AdapterError::InvalidPath);
        }
        Ok(())
    }
}

impl Adapter for FileAdapter {
    fn load_policy(&mut self, m: &mut Model) -> Result<(), AdapterError> {
        self.check_path()?;
        let text = std::fs::read_to_string(&self.file_path)?;
        for line in text.lines() {
            load_policy_line(line, m).map_err(|e| {
                AdapterError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                ))
            })?;
        }
        Ok(())
    }

    fn save_policy(&mut self, m: &Model) -> Result<(), AdapterError> {
        self.check_path()?;
        let mut file = std::fs::File::create(&self.file_path)?;
        file.write_all(m.policy_text().as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// A [`FileAdapter`] that can load a positional-filtered subset. After a
/// filtered load the adapter refuses to save, protecting the source file
/// from truncation.
pub struct FilteredFileAdapter {
    inner: FileAdapter,
    filtered: bool,
}

impl FilteredFileAdapter {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: FileAdapter::new(file_path),
            filtered: false,
        }
    }
}

impl Adapter for FilteredFileAdapter {
    fn load_policy(&mut self, m: &mut Model) -> Result<(), AdapterError> {
        self.filtered = false;
        self.inner.load_policy(m)
    }

    fn save_policy(&mut self, m: &Model) -> Result<(), AdapterError> {
        if self.filtered {
            return Err(AdapterError::FilteredSaveRefused);
        }
        self.inner.save_policy(m)
    }

    fn load_filtered_policy(&mut self, m: &mut Model, filter: &Filter) -> Result<(), AdapterError> {
        if filter.is_empty() {
            return self.load_policy(m);
        }
        self.inner.check_path()?;
        let text = std::fs::read_to_string(&self.inner.file_path)?;
        for line in text.lines() {
            let Some(fields) = parse_policy_line(line) else {
                continue;
            };
            if !filter.keeps(&fields) {
                continue;
            }
            load_policy_fields(&fields, m).map_err(|e| {
                AdapterError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                ))
            })?;
        }
        self.filtered = true;
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rbac_model() -> Model {
        let mut m = Model::new();
        m.add_def("r", "r", "sub, obj, act");
        m.add_def("p", "p", "sub, obj, act");
        m.add_def("g", "g", "_, _");
        m.add_def("e", "e", "some(where (p.eft == allow))");
        m.add_def("m", "m", "g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act");
        m
    }

    const POLICY: &str = "\
p, alice, data1, read
p, bob, data2, write

# groups
g, alice, data2_admin
";

    fn temp_policy_file(content: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn load_skips_blanks_and_comments() {
        let file = temp_policy_file(POLICY);
        let mut adapter = FileAdapter::new(file.path());
        let mut m = rbac_model();
        adapter.load_policy(&mut m).unwrap();
        assert_eq!(m.get_policy("p", "p").len(), 2);
        assert_eq!(m.get_policy("g", "g").len(), 1);
    }

    #[test]
    fn save_then_load_is_a_fixpoint() {
        let file = temp_policy_file(POLICY);
        let mut adapter = FileAdapter::new(file.path());
        let mut m = rbac_model();
        adapter.load_policy(&mut m).unwrap();
        adapter.save_policy(&m).unwrap();

        let mut m2 = rbac_model();
        adapter.load_policy(&mut m2).unwrap();
        assert_eq!(m.get_policy("p", "p"), m2.get_policy("p", "p"));
        assert_eq!(m.get_policy("g", "g"), m2.get_policy("g", "g"));

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut adapter = FileAdapter::new("");
        let mut m = rbac_model();
        assert!(matches!(
            adapter.load_policy(&mut m),
            Err(AdapterError::InvalidPath)
        ));
        assert!(matches!(
            adapter.save_policy(&m),
            Err(AdapterError::InvalidPath)
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut adapter = FileAdapter::new("/nonexistent/policy.csv");
        let mut m = rbac_model();
        assert!(matches!(
            adapter.load_policy(&mut m),
            Err(AdapterError::Io(_))
        ));
    }

    #[test]
    fn auto_save_ops_are_not_implemented() {
        let mut adapter = FileAdapter::new("whatever.csv");
        assert!(matches!(
            adapter.add_policy("p", "p", &["a".to_string()]),
            Err(AdapterError::NotImplemented(_))
        ));
    }

    #[test]
    fn filtered_load_selects_and_locks_saving() {
        let file = temp_policy_file(POLICY);
        let mut adapter = FilteredFileAdapter::new(file.path());
        let mut m = rbac_model();
        let filter = Filter::new().with("p", &["alice"]);
        adapter.load_filtered_policy(&mut m, &filter).unwrap();

        assert!(adapter.is_filtered());
        assert_eq!(m.get_policy("p", "p").len(), 1);
        // "g" had no filter entry and is loaded whole.
        assert_eq!(m.get_policy("g", "g").len(), 1);
        assert!(matches!(
            adapter.save_policy(&m),
            Err(AdapterError::FilteredSaveRefused)
        ));
    }

    #[test]
    fn empty_filter_resets_to_unfiltered() {
        let file = temp_policy_file(POLICY);
        let mut adapter = FilteredFileAdapter::new(file.path());
        let mut m = rbac_model();
        adapter
            .load_filtered_policy(&mut m, &Filter::new())
            .unwrap();
        assert!(!adapter.is_filtered());
        assert!(adapter.save_policy(&m).is_ok());
    }
}
