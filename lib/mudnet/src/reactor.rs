//! Small readiness-loop helpers shared by the master's event loop and each
//! worker's own two-source (TCP + IPC channel) loop: readiness toggles a
//! drain loop that keeps calling an operation until it reports
//! `NetworkError::Wait`, at which point the fd has caught up.

use flux::shared::{ErrorType, NetworkError, NetworkResult};

/// Drains `op` until it signals `Wait`, returning the first fatal error (if
/// any). Only invoked when `trigger` (the readiness flag for this fd/event)
/// is set.
#[inline]
pub fn drain_while_ready<F>(trigger: bool, mut op: F) -> Result<(), ErrorType>
where
    F: FnMut() -> NetworkResult<()>,
{
    if trigger {
        loop {
            match op() {
                Ok(()) => continue,
                Err(NetworkError::Wait) => break,
                Err(NetworkError::Fatal(kind)) => return Err(kind),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_on_wait() {
        let mut calls = 0;
        let result = drain_while_ready(true, || {
            calls += 1;
            if calls < 3 {
                Ok(())
            } else {
                Err(NetworkError::Wait)
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn propagates_fatal_error() {
        let result = drain_while_ready(true, || Err(NetworkError::Fatal(ErrorType::Serialization)));
        assert_eq!(result, Err(ErrorType::Serialization));
    }

    #[test]
    fn skips_when_not_triggered() {
        let mut calls = 0;
        let result = drain_while_ready(false, || {
            calls += 1;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls, 0);
    }
}
