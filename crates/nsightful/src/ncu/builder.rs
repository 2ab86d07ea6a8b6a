//! Fold classified records into a `ParsedProfile`.

use super::classifier::Record;
use super::schema::{Kernel, KernelId, ParsedProfile, Section};
use super::sections::extract_kernel_name;
use crate::utils::error::NcuError;
use indexmap::IndexMap;

/// Incremental builder for the kernel -> section tree.
///
/// The tree only leaves the builder through [`TreeBuilder::finish`]; a
/// failed `push` leaves nothing for the caller to observe.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    profile: ParsedProfile,
    kernel: Option<KernelId>,
    section: Option<String>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one record. `line` is only used for error reporting.
    pub fn push(&mut self, record: Record, line: u64) -> Result<(), NcuError> {
        match record {
            Record::TableHeader(_) | Record::Blank => Ok(()),
            Record::KernelBoundary { id, full_name } => self.open_kernel(id, full_name, line),
            Record::SectionBoundary { name } => self.open_section(name, line),
            Record::Metric(metric) => {
                self.current_section(line)?.metrics.push(metric);
                Ok(())
            }
            Record::Advisory(advisory) => {
                self.current_section(line)?.advisories.push(advisory);
                Ok(())
            }
        }
    }

    pub fn finish(self) -> ParsedProfile {
        self.profile
    }

    fn open_kernel(&mut self, id: KernelId, full_name: String, line: u64) -> Result<(), NcuError> {
        if self.profile.kernels.contains_key(&id) {
            return Err(self.error(
                line,
                format!("kernel launch {} reappears after other launches", id),
            ));
        }

        let kernel = Kernel {
            id: id.clone(),
            name: extract_kernel_name(&full_name),
            full_name,
            sections: IndexMap::new(),
        };
        self.profile.kernels.insert(id.clone(), kernel);
        self.kernel = Some(id);
        self.section = None;
        Ok(())
    }

    fn open_section(&mut self, name: String, line: u64) -> Result<(), NcuError> {
        let Some(kernel) = self
            .kernel
            .as_ref()
            .and_then(|id| self.profile.kernels.get_mut(id))
        else {
            return Err(self.error(line, format!("section '{}' outside of any kernel", name)));
        };

        if kernel.sections.contains_key(&name) {
            return Err(self.error(
                line,
                format!("section '{}' reopened after another section", name),
            ));
        }

        kernel.sections.insert(name.clone(), Section::new(name.clone()));
        self.section = Some(name);
        Ok(())
    }

    fn current_section(&mut self, line: u64) -> Result<&mut Section, NcuError> {
        let (id, name) = match (&self.kernel, &self.section) {
            (Some(id), Some(name)) => (id, name),
            _ => return Err(self.error(line, "record outside of any section".to_string())),
        };

        self.profile
            .kernels
            .get_mut(id)
            .and_then(|kernel| kernel.sections.get_mut(name))
            .ok_or_else(|| NcuError::Structural {
                line,
                kernel: Some(id.to_string()),
                section: Some(name.clone()),
                message: "section is not open".to_string(),
            })
    }

    fn error(&self, line: u64, message: String) -> NcuError {
        NcuError::Structural {
            line,
            kernel: self
                .kernel
                .as_ref()
                .and_then(|id| self.profile.kernels.get(id))
                .map(|k| k.full_name.clone()),
            section: self.section.clone(),
            message,
        }
    }
}
