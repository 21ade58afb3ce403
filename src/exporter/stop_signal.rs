use tokio_util::sync::{CancellationToken, DropGuard};

/// Stops the paired background task when dropped.
pub(crate) struct Stopper {
    _guard: DropGuard,
}

#[derive(Clone)]
pub(crate) struct StopCheck {
    token: CancellationToken,
}

impl StopCheck {
    pub(crate) fn should_stop(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the `Stopper` is dropped.
    pub(crate) async fn stopped(&self) {
        self.token.cancelled().await
    }
}

pub(crate) fn new() -> (Stopper, StopCheck) {
    let token = CancellationToken::new();
    let stop_check = StopCheck { token: token.clone() };

    (
        Stopper {
            _guard: token.drop_guard(),
        },
        stop_check,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_stopper_wakes_check() {
        let (stopper, stop_check) = new();
        assert!(!stop_check.should_stop());

        let waiter = tokio::spawn({
            let stop_check = stop_check.clone();
            async move { stop_check.stopped().await }
        });
        drop(stopper);

        waiter.await.unwrap();
        assert!(stop_check.should_stop());
    }
}
