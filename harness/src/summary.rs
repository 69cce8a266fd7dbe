use crate::console;
use pipeline::ExecutionResult;
use serde::Serialize;

const NAME_WIDTH: usize = 24;

/// One outcome per attempted target, in execution order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    results: Vec<ExecutionResult>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ExecutionResult> {
        self.results
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    /// True only when something ran and nothing failed
    pub fn all_passed(&self) -> bool {
        self.total_count() > 0 && self.passed_count() == self.total_count()
    }

    pub fn exit_code(&self) -> u8 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let label = if result.passed { "PASSED" } else { "FAILED" };
            out.push_str(&format!(
                "{:<width$} {}\n",
                result.target_name,
                label,
                width = NAME_WIDTH
            ));
        }

        let failures: Vec<_> = self
            .results
            .iter()
            .filter_map(|r| r.failure.as_ref().map(|f| (&r.target_name, f)))
            .collect();
        if !failures.is_empty() {
            out.push_str("\nFailures:\n");
            for (name, failure) in failures {
                out.push_str(&format!("  {}: {}\n", name, failure));
            }
        }

        out.push_str(&format!(
            "\nTotal: {}/{} tests passed\n",
            self.passed_count(),
            self.total_count()
        ));

        if self.all_passed() {
            out.push_str("\n*** ALL TESTS PASSED ***\n");
        } else if self.total_count() == 0 {
            out.push_str("\n[!] No test targets were selected\n");
        } else {
            out.push_str(&format!(
                "\n[!] {} test(s) failed\n",
                self.total_count() - self.passed_count()
            ));
        }
        out
    }

    pub fn print(&self) {
        console::banner("SUMMARY");
        print!("{}", self.render());
    }
}
