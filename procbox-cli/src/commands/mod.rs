pub mod output;
pub mod start;
pub mod stat;
pub mod stop;

use procbox_shared::ProcessStatus;

/// Human line for stop/stat results.
pub(crate) fn status_line(id: &str, status: &ProcessStatus) -> String {
    if status.exited {
        format!("process {}: EXITED; exit code: {}", id, status.exit_code)
    } else {
        format!("process {}: RUNNING", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_running() {
        let status = ProcessStatus {
            exited: false,
            exit_code: 0,
        };
        assert_eq!(
            status_line("01ABC", &status),
            "process 01ABC: RUNNING"
        );
    }

    #[test]
    fn test_status_line_exited() {
        let status = ProcessStatus {
            exited: true,
            exit_code: 143,
        };
        assert_eq!(
            status_line("01ABC", &status),
            "process 01ABC: EXITED; exit code: 143"
        );
    }
}
