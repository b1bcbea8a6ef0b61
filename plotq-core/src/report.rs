use std::fmt;

use crate::domain::DetailLevel;
use crate::error::Result;
use crate::queue::QueueProvider;
use crate::reconcile::ShadowState;

const MIN_COUNT_WIDTH: usize = 3;
const MIN_SIZE_WIDTH: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportRow {
    Batch { name: String, count: u64, size: u64 },
    /// Aggregate counters only; never followed by fragment rows.
    Remainder { name: String, count: u64, size: u64 },
    Fragment {
        raw_name: String,
        length: u64,
        preview: Option<String>,
    },
    Duplicate { raw_name: String },
}

/// Rendered view of the batch list at one detail level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueReport {
    pub level: DetailLevel,
    pub rows: Vec<ReportRow>,
}

impl QueueReport {
    pub fn empty(level: DetailLevel) -> Self {
        Self {
            level,
            rows: Vec::new(),
        }
    }

    pub fn build(
        state: &ShadowState,
        level: DetailLevel,
        provider: &dyn QueueProvider,
        preview_width: usize,
    ) -> Result<Self> {
        let mut rows = Vec::new();
        for (idx, batch) in state.batches.iter().enumerate() {
            let remainder = state
                .remainder
                .as_ref()
                .filter(|r| idx == 0 && r.batch_name == batch.name);
            if let Some(r) = remainder {
                rows.push(ReportRow::Remainder {
                    name: batch.name.clone(),
                    count: r.remaining_count,
                    size: r.remaining_size,
                });
                continue;
            }

            rows.push(ReportRow::Batch {
                name: batch.name.clone(),
                count: batch.fragment_count(),
                size: batch.declared_size,
            });
            if !level.shows_fragments() {
                continue;
            }
            for (raw_name, &length) in &batch.fragments {
                let preview = match level {
                    DetailLevel::DetailWithPayload => Some(preview(
                        provider.payload(raw_name)?.as_deref().unwrap_or(""),
                        preview_width,
                    )),
                    _ => None,
                };
                rows.push(ReportRow::Fragment {
                    raw_name: raw_name.clone(),
                    length,
                    preview,
                });
            }
            for raw_name in &batch.duplicates {
                rows.push(ReportRow::Duplicate {
                    raw_name: raw_name.clone(),
                });
            }
        }
        Ok(Self { level, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(name, count, size)` of every batch-level row, remainder included.
    pub fn batch_rows(&self) -> Vec<(&str, u64, u64)> {
        self.rows
            .iter()
            .filter_map(|row| match row {
                ReportRow::Batch { name, count, size } | ReportRow::Remainder { name, count, size } => {
                    Some((name.as_str(), *count, *size))
                }
                _ => None,
            })
            .collect()
    }
}

/// Fixed-width single-line preview of a device command string.
pub fn preview(text: &str, width: usize) -> String {
    let clipped: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(width)
        .collect();
    format!("{clipped:<width$}")
}

fn digits(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

struct Widths {
    label: usize,
    count: usize,
    size: usize,
}

impl Widths {
    fn measure(rows: &[ReportRow]) -> Self {
        let mut w = Widths {
            label: 0,
            count: MIN_COUNT_WIDTH,
            size: MIN_SIZE_WIDTH,
        };
        for row in rows {
            match row {
                ReportRow::Batch { name, count, size } | ReportRow::Remainder { name, count, size } => {
                    w.label = w.label.max(name.chars().count());
                    w.count = w.count.max(digits(*count));
                    w.size = w.size.max(digits(*size));
                }
                ReportRow::Fragment {
                    raw_name, length, ..
                } => {
                    w.label = w.label.max(raw_name.chars().count() + 2);
                    w.size = w.size.max(digits(*length));
                }
                ReportRow::Duplicate { raw_name } => {
                    w.label = w.label.max(raw_name.chars().count() + 2);
                }
            }
        }
        w
    }
}

impl fmt::Display for QueueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "Queue is empty");
        }
        let w = Widths::measure(&self.rows);
        // Fragment lengths line up under the batch size column.
        let skip = " ".repeat(w.count + 3);
        for row in &self.rows {
            match row {
                ReportRow::Batch { name, count, size } => {
                    writeln!(f, "{name:<lw$} [{count:>cw$}] [{size:>sw$}]", lw = w.label, cw = w.count, sw = w.size)?;
                }
                ReportRow::Remainder { name, count, size } => {
                    writeln!(
                        f,
                        "{name:<lw$} [{count:>cw$}] [{size:>sw$}] remaining",
                        lw = w.label,
                        cw = w.count,
                        sw = w.size
                    )?;
                }
                ReportRow::Fragment {
                    raw_name,
                    length,
                    preview,
                } => {
                    let label = format!("  {raw_name}");
                    write!(f, "{label:<lw$}{skip} [{length:>sw$}]", lw = w.label, sw = w.size)?;
                    match preview {
                        Some(p) => writeln!(f, " \"{p}\"")?,
                        None => writeln!(f)?,
                    }
                }
                ReportRow::Duplicate { raw_name } => {
                    let label = format!("  {raw_name}");
                    writeln!(f, "{label:<lw$}{skip} duplicate", lw = w.label)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<ReportRow> {
        vec![
            ReportRow::Batch {
                name: "Tri".into(),
                count: 2,
                size: 22,
            },
            ReportRow::Fragment {
                raw_name: "Tri_1_t_1_010".into(),
                length: 10,
                preview: None,
            },
            ReportRow::Fragment {
                raw_name: "Tri_1_t_2_012".into(),
                length: 12,
                preview: None,
            },
            ReportRow::Batch {
                name: "LissajousPattern".into(),
                count: 1,
                size: 123456,
            },
        ]
    }

    #[test]
    fn size_column_is_aligned_across_rows() {
        let report = QueueReport {
            level: DetailLevel::Detail,
            rows: rows(),
        };
        let text = report.to_string();
        let closes: Vec<usize> = text.lines().map(|l| l.rfind(']').unwrap()).collect();
        assert!(closes.windows(2).all(|p| p[0] == p[1]), "{text}");
        assert_eq!(text.lines().next().unwrap(), format!("{:<16} [  2] [    22]", "Tri"));
        assert_eq!(
            text.lines().nth(1).unwrap(),
            format!("{:<16}{} [    10]", "  Tri_1_t_1_010", " ".repeat(6))
        );
    }

    #[test]
    fn empty_report_text() {
        assert_eq!(QueueReport::empty(DetailLevel::None).to_string(), "Queue is empty\n");
    }

    #[test]
    fn remainder_row_is_marked() {
        let report = QueueReport {
            level: DetailLevel::None,
            rows: vec![ReportRow::Remainder {
                name: "B".into(),
                count: 2,
                size: 20,
            }],
        };
        assert_eq!(report.to_string(), "B [  2] [   20] remaining\n");
    }

    #[test]
    fn preview_is_fixed_width() {
        assert_eq!(preview("PU0,0;\nPD10,10;", 8), "PU0,0; P");
        assert_eq!(preview("SP1;", 6), "SP1;  ");
        assert_eq!(preview("", 3).len(), 3);
    }

    #[test]
    fn digit_counts() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(123456), 6);
    }
}
