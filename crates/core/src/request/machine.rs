//! The request state machine transition table.
//!
//! Every store-level transition is validated here; a processor observing an
//! incompatible state simply refuses to act.

use super::types::RequestStatus;

/// Whether `from -> to` is a legal transition.
pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;

    match (from, to) {
        // search: select a candidate, stay for a retry round, or give up
        (AwaitingSearch, AwaitingDownload) => true,
        (AwaitingSearch, AwaitingSearch) => true,
        (AwaitingSearch, Failed) => true,

        // handoff to a download client
        (AwaitingDownload, Downloading) => true,
        (AwaitingDownload, Failed) => true,

        // monitor polls until the client reports a terminal state
        (Downloading, Downloading) => true,
        (Downloading, AwaitingImport) => true,
        (Downloading, Failed) => true,

        // organize claims the import, may bounce it back, exhaust, or fail
        (AwaitingImport, Processing) => true,
        (AwaitingImport, AwaitingImport) => true,
        (AwaitingImport, Warn) => true,
        (AwaitingImport, Failed) => true,

        // once claimed, organize finishes or unwinds
        (Processing, Downloaded) => true,
        (Processing, AwaitingImport) => true,
        (Processing, Warn) => true,
        (Processing, Failed) => true,

        // promotion only on confirmed library visibility
        (Downloaded, Completed) => true,

        // warn is manually restartable
        (Warn, AwaitingImport) => true,
        (Warn, AwaitingSearch) => true,

        // user cancellation from any non-terminal state
        (from, Cancelled) => !from.is_terminal(),

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestStatus::*;

    #[test]
    fn test_happy_path_edges() {
        assert!(can_transition(AwaitingSearch, AwaitingDownload));
        assert!(can_transition(AwaitingDownload, Downloading));
        assert!(can_transition(Downloading, AwaitingImport));
        assert!(can_transition(AwaitingImport, Processing));
        assert!(can_transition(Processing, Downloaded));
        assert!(can_transition(Downloaded, Completed));
    }

    #[test]
    fn test_retry_edges() {
        assert!(can_transition(AwaitingSearch, AwaitingSearch));
        assert!(can_transition(Downloading, Downloading));
        assert!(can_transition(Processing, AwaitingImport));
    }

    #[test]
    fn test_terminal_states_never_leave() {
        for from in [Completed, Failed, Cancelled] {
            for to in [
                AwaitingSearch,
                AwaitingDownload,
                Downloading,
                AwaitingImport,
                Processing,
                Downloaded,
                Completed,
                Warn,
                Failed,
                Cancelled,
            ] {
                assert!(!can_transition(from, to), "{from:?} -> {to:?} must refuse");
            }
        }
    }

    #[test]
    fn test_cancel_from_active_states() {
        for from in [
            AwaitingSearch,
            AwaitingDownload,
            Downloading,
            AwaitingImport,
            Processing,
            Downloaded,
            Warn,
        ] {
            assert!(can_transition(from, Cancelled));
        }
    }

    #[test]
    fn test_warn_is_manually_restartable() {
        assert!(can_transition(Warn, AwaitingImport));
        assert!(can_transition(Warn, AwaitingSearch));
        assert!(!can_transition(Warn, Downloaded));
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!can_transition(AwaitingSearch, Downloading));
        assert!(!can_transition(AwaitingDownload, Downloaded));
        assert!(!can_transition(Downloading, Completed));
    }
}
