//! Builds user-log text the way the pool writes it.

/// Accumulates user-log records.
///
/// # Example
///
/// ```
/// use exerciser_core::testing::UserLogBuilder;
///
/// let log = UserLogBuilder::new()
///     .submitted(12, 0, "exerciser_info:sleep,UCSD,0")
///     .executing(12, 0)
///     .exited(12, 0, 0)
///     .build();
/// assert!(log.starts_with("000 (12.000.000) "));
/// ```
#[derive(Debug, Clone, Default)]
pub struct UserLogBuilder {
    text: String,
}

impl UserLogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(self, cluster: u64, proc: u64, notes: &str) -> Self {
        self.record(
            0,
            cluster,
            proc,
            "13:05:00",
            "Job submitted from host: <127.0.0.1:9618>",
            &[&format!("    {notes}")],
        )
    }

    pub fn executing(self, cluster: u64, proc: u64) -> Self {
        self.record(1, cluster, proc, "13:06:00", "Job executing on host: <127.0.0.1:9618>", &[])
    }

    pub fn exited(self, cluster: u64, proc: u64, return_value: i32) -> Self {
        self.record(
            5,
            cluster,
            proc,
            "13:07:00",
            "Job terminated.",
            &[&format!("\t(1) Normal termination (return value {return_value})")],
        )
    }

    pub fn signaled(self, cluster: u64, proc: u64, signal: i32) -> Self {
        self.record(
            5,
            cluster,
            proc,
            "13:07:00",
            "Job terminated.",
            &[&format!("\t(0) Abnormal termination (signal {signal})")],
        )
    }

    pub fn aborted(self, cluster: u64, proc: u64) -> Self {
        self.record(
            9,
            cluster,
            proc,
            "13:08:00",
            "Job was aborted.",
            &["\tvia condor_rm (by user exerciser)"],
        )
    }

    fn record(mut self, code: u16, cluster: u64, proc: u64, time: &str, text: &str, body: &[&str]) -> Self {
        self.text
            .push_str(&format!("{code:03} ({cluster}.{proc:03}.000) 2024-06-01 {time} {text}\n"));
        for line in body {
            self.text.push_str(line);
            self.text.push('\n');
        }
        self.text.push_str("...\n");
        self
    }

    pub fn build(self) -> String {
        self.text
    }
}
