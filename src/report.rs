//! Statistics over one run's result records.
//!
//! Everything here is a pure function of `(records, total_duration)`. Latency
//! percentiles use the nearest-rank method with index clamping, not
//! interpolation, so the same records always yield the same numbers.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::errors::categorize_status_code;
use crate::record::ResultRecord;

/// Printed instead of a report when a run produced no records.
pub const NO_RESULTS_MESSAGE: &str = "No results to report";

/// Error text used for failed records that carry none (non-200 responses).
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report to '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Nearest-rank percentile.
///
/// Sorts ascending, takes `index = floor(percentile / 100 * count)`, clamps it
/// to the last element and returns the value there. Empty input yields 0.
pub fn percentile(data: &[f64], percentile: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_of_sorted(&sorted, percentile)
}

fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    // `as usize` truncates toward zero and saturates negatives to 0.
    let index = ((percentile / 100.0) * sorted.len() as f64) as usize;
    sorted[index.min(sorted.len() - 1)]
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Response time statistics in seconds, over successful requests only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyStats {
    /// Returns `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: median_of_sorted(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p95: percentile_of_sorted(&sorted, 95.0),
            p99: percentile_of_sorted(&sorted, 99.0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status_code: u16,
    pub count: usize,
    /// Share of all records, 0 to 100.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCount {
    pub message: String,
    pub count: usize,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub total_duration_secs: f64,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate: f64,
    pub requests_per_second: f64,
    pub bytes_received: u64,
    pub latency: Option<LatencyStats>,
    /// Ascending by status code; failed requests appear as code 0.
    pub status_codes: Vec<StatusCount>,
    /// Failed requests grouped by error text, in first-seen order.
    pub errors: Vec<ErrorCount>,
}

impl RunReport {
    /// Builds the report, or `None` when there is nothing to report.
    pub fn from_records(records: &[ResultRecord], total_duration: Duration) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let total_requests = records.len();
        let successful_times: Vec<f64> = records
            .iter()
            .filter(|r| r.success())
            .map(|r| r.response_time().as_secs_f64())
            .collect();
        let successful_requests = successful_times.len();
        let failed_requests = total_requests - successful_requests;

        let total_duration_secs = total_duration.as_secs_f64();
        let requests_per_second = if total_duration_secs > 0.0 {
            total_requests as f64 / total_duration_secs
        } else {
            0.0
        };

        let mut by_status: BTreeMap<u16, usize> = BTreeMap::new();
        for record in records {
            *by_status.entry(record.status_code()).or_insert(0) += 1;
        }
        let status_codes = by_status
            .into_iter()
            .map(|(status_code, count)| StatusCount {
                status_code,
                count,
                percentage: count as f64 / total_requests as f64 * 100.0,
            })
            .collect();

        Some(Self {
            total_duration_secs,
            total_requests,
            successful_requests,
            failed_requests,
            success_rate: successful_requests as f64 / total_requests as f64 * 100.0,
            requests_per_second,
            bytes_received: records.iter().map(|r| r.content_length()).sum(),
            latency: LatencyStats::from_samples(&successful_times),
            status_codes,
            errors: summarize_errors(records),
        })
    }

    /// Writes the report as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

fn summarize_errors(records: &[ResultRecord]) -> Vec<ErrorCount> {
    let mut errors: Vec<ErrorCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records.iter().filter(|r| !r.success()) {
        let message = record.error().unwrap_or(UNKNOWN_ERROR);
        match index.get(message) {
            Some(&i) => errors[i].count += 1,
            None => {
                index.insert(message, errors.len());
                errors.push(ErrorCount {
                    message: message.to_string(),
                    count: 1,
                });
            }
        }
    }

    errors
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "LOAD TEST RESULTS")?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Total Duration: {:.2} seconds", self.total_duration_secs)?;
        writeln!(f, "Total Requests: {}", self.total_requests)?;
        writeln!(f, "Successful Requests: {}", self.successful_requests)?;
        writeln!(f, "Failed Requests: {}", self.failed_requests)?;
        writeln!(f, "Success Rate: {:.2}%", self.success_rate)?;
        writeln!(f, "Requests per Second: {:.2}", self.requests_per_second)?;
        writeln!(f, "Bytes Received: {}", self.bytes_received)?;

        if let Some(ref latency) = self.latency {
            writeln!(f)?;
            writeln!(f, "Response Time Statistics:")?;
            writeln!(f, "Average: {:.3}s", latency.mean)?;
            writeln!(f, "Median: {:.3}s", latency.median)?;
            writeln!(f, "Min: {:.3}s", latency.min)?;
            writeln!(f, "Max: {:.3}s", latency.max)?;
            writeln!(f, "95th Percentile: {:.3}s", latency.p95)?;
            writeln!(f, "99th Percentile: {:.3}s", latency.p99)?;
        }

        writeln!(f)?;
        writeln!(f, "Status Code Distribution:")?;
        for status in &self.status_codes {
            writeln!(
                f,
                "  {} ({}): {} ({:.1}%)",
                status.status_code,
                categorize_status_code(status.status_code),
                status.count,
                status.percentage
            )?;
        }

        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Error Summary:")?;
            for error in &self.errors {
                writeln!(f, "  {}: {}", error.message, error.count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(secs: f64) -> ResultRecord {
        ResultRecord::response(0, 200, 100, Duration::from_secs_f64(secs))
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 95.0), 5.0);
        assert_eq!(percentile(&data, 50.0), 3.0);
        assert_eq!(percentile(&data, 20.0), 2.0);
    }

    #[test]
    fn test_percentile_bounds() {
        let data = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&data, 100.0), 4.0);
        assert_eq!(percentile(&data, 0.0), 1.0);
    }

    #[test]
    fn test_percentile_is_biased_low_without_interpolation() {
        // floor(0.5 * 4) = 2 picks the third element, no averaging.
        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0], 50.0), 30.0);
        // floor(0.95 * 10) = 9 is the last element.
        let ten: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&ten, 95.0), 10.0);
        // floor(0.9 * 10) = 9 as well.
        assert_eq!(percentile(&ten, 90.0), 10.0);
        assert_eq!(percentile(&ten, 85.0), 9.0);
    }

    #[test]
    fn test_percentile_empty_and_deterministic() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        let data = [0.3, 0.1, 0.9, 0.5];
        assert_eq!(percentile(&data, 75.0), percentile(&data, 75.0));
    }

    #[test]
    fn test_latency_stats_example() {
        let stats = LatencyStats::from_samples(&[3.0, 1.0, 5.0, 2.0, 4.0]).unwrap();
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.p95, 5.0);
        assert_eq!(stats.p99, 5.0);
    }

    #[test]
    fn test_median_even_count_averages_middle() {
        let stats = LatencyStats::from_samples(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.median, 2.5);
    }

    #[test]
    fn test_empty_records_short_circuit() {
        assert!(RunReport::from_records(&[], Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_counts_and_rates() {
        let records = vec![
            ok(1.0),
            ok(2.0),
            ResultRecord::response(1, 404, 10, Duration::from_millis(5)),
            ResultRecord::failure(2, "connection refused", Duration::from_millis(1)),
        ];
        let report = RunReport::from_records(&records, Duration::from_secs(2)).unwrap();

        assert_eq!(report.total_requests, 4);
        assert_eq!(report.successful_requests, 2);
        assert_eq!(report.failed_requests, 2);
        assert_eq!(report.success_rate, 50.0);
        assert_eq!(report.requests_per_second, 2.0);
        assert_eq!(report.bytes_received, 210);
        // Latency ignores the failed records.
        assert_eq!(report.latency.as_ref().unwrap().max, 2.0);
    }

    #[test]
    fn test_zero_duration_throughput_is_zero() {
        let report = RunReport::from_records(&[ok(0.1)], Duration::ZERO).unwrap();
        assert_eq!(report.requests_per_second, 0.0);
    }

    #[test]
    fn test_no_successes_means_no_latency() {
        let records = vec![ResultRecord::failure(0, "timeout", Duration::from_secs(30))];
        let report = RunReport::from_records(&records, Duration::from_secs(30)).unwrap();
        assert!(report.latency.is_none());
        assert_eq!(report.success_rate, 0.0);
    }

    #[test]
    fn test_status_distribution_sorted_and_sums_to_100() {
        let records = vec![
            ResultRecord::response(0, 500, 0, Duration::ZERO),
            ok(0.1),
            ResultRecord::failure(0, "dns error", Duration::ZERO),
            ok(0.2),
            ResultRecord::response(0, 301, 0, Duration::ZERO),
            ok(0.3),
        ];
        let report = RunReport::from_records(&records, Duration::from_secs(1)).unwrap();

        let codes: Vec<u16> = report.status_codes.iter().map(|s| s.status_code).collect();
        assert_eq!(codes, vec![0, 200, 301, 500]);
        assert_eq!(report.status_codes[1].count, 3);
        let total: f64 = report.status_codes.iter().map(|s| s.percentage).sum();
        assert!((total - 100.0).abs() < 1e-9, "sum was {}", total);
    }

    #[test]
    fn test_error_summary_groups_by_message_in_first_seen_order() {
        let records = vec![
            ResultRecord::failure(0, "timeout", Duration::ZERO),
            ResultRecord::response(0, 503, 0, Duration::ZERO),
            ok(0.1),
            ResultRecord::failure(1, "timeout", Duration::ZERO),
            ResultRecord::failure(1, "connection reset", Duration::ZERO),
        ];
        let report = RunReport::from_records(&records, Duration::from_secs(1)).unwrap();

        assert_eq!(
            report.errors,
            vec![
                ErrorCount {
                    message: "timeout".to_string(),
                    count: 2
                },
                ErrorCount {
                    message: UNKNOWN_ERROR.to_string(),
                    count: 1
                },
                ErrorCount {
                    message: "connection reset".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_display_contains_sections() {
        let records = vec![
            ok(1.0),
            ResultRecord::failure(0, "connection refused", Duration::ZERO),
        ];
        let text = RunReport::from_records(&records, Duration::from_secs(4))
            .unwrap()
            .to_string();

        assert!(text.contains("LOAD TEST RESULTS"));
        assert!(text.contains("Total Duration: 4.00 seconds"));
        assert!(text.contains("Success Rate: 50.00%"));
        assert!(text.contains("Requests per Second: 0.50"));
        assert!(text.contains("95th Percentile: 1.000s"));
        assert!(text.contains("  0 (Request Failed): 1 (50.0%)"));
        assert!(text.contains("  200 (OK): 1 (50.0%)"));
        assert!(text.contains("Error Summary:"));
        assert!(text.contains("  connection refused: 1"));
    }

    #[test]
    fn test_display_omits_error_summary_when_all_succeed() {
        let text = RunReport::from_records(&[ok(0.5)], Duration::from_secs(1))
            .unwrap()
            .to_string();
        assert!(!text.contains("Error Summary"));
    }
}
