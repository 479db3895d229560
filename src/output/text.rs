//! Plain-text report for terminals.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::duplicates::DetectionReport;

/// Human-readable listing of a detection report.
pub struct TextOutput<'a> {
    report: &'a DetectionReport,
}

impl<'a> TextOutput<'a> {
    #[must_use]
    pub fn new(report: &'a DetectionReport) -> Self {
        Self { report }
    }

    /// Write every group, then warnings, then a one-line summary.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let report = self.report;

        for (i, group) in report.groups.iter().enumerate() {
            writeln!(
                writer,
                "Group {} [{}] confidence {:.2}, {} files, {} reclaimable",
                i + 1,
                group.method,
                group.confidence,
                group.len(),
                ByteSize::b(group.wasted_bytes())
            )?;
            for member in &group.members {
                writeln!(
                    writer,
                    "  {:>10}  {}",
                    ByteSize::b(member.size_bytes()).to_string(),
                    member.path().display()
                )?;
            }
            let suggestion = &group.suggestion;
            writeln!(writer, "  suggested: {}", group.suggested_action)?;
            writeln!(
                writer,
                "  sizes {}, modified {}",
                suggestion.size_range, suggestion.modified_range
            )?;
            writeln!(writer, "  options: {}", suggestion.options.join(" | "))?;
            writeln!(writer)?;
        }

        for warning in &report.warnings {
            writeln!(writer, "warning: {warning}")?;
        }

        let stats = &report.stats;
        writeln!(
            writer,
            "{} groups among {} files, {} reclaimable ({} skipped, {:.2?})",
            report.groups.len(),
            stats.input_files,
            ByteSize::b(report.reclaimable_bytes()),
            stats.content_skipped,
            stats.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::{Candidate, DetectionMethod, DuplicateGroup, PassWarning};
    use crate::scanner::FileRecord;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn render(report: &DetectionReport) -> String {
        let mut buffer = Vec::new();
        TextOutput::new(report).write_to(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_empty_report() {
        let text = render(&DetectionReport::default());
        assert!(text.starts_with("0 groups among 0 files"));
    }

    #[test]
    fn test_groups_and_warnings() {
        let now = SystemTime::now();
        let records = vec![
            FileRecord::new(PathBuf::from("/virtual/song.mp3"), 2048, now),
            FileRecord::new(PathBuf::from("/virtual/song (1).mp3"), 2048, now),
        ];
        let candidate = Candidate::new(vec![0, 1], DetectionMethod::SimilarName, 0.8);
        let report = DetectionReport {
            groups: vec![DuplicateGroup::from_candidate(&candidate, &records).unwrap()],
            warnings: vec![PassWarning {
                method: DetectionMethod::PerceptualImage,
                message: "deadline exceeded".to_string(),
            }],
            ..DetectionReport::default()
        };

        let text = render(&report);
        assert!(text.contains("Group 1 [similar_name] confidence 0.80, 2 files"));
        assert!(text.contains("/virtual/song (1).mp3"));
        assert!(text.contains("suggested: review as possible different versions"));
        assert!(text.contains("keep all | choose manually"));
        assert!(text.contains("warning: perceptual_image pass skipped: deadline exceeded"));
    }
}
