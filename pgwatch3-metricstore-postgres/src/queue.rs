use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use pgwatch3_metricstore_common::{MeasurementBatch, WriterError};

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// `write(batch)` entry point: enqueues with a five-second upper
/// bound, dropping the batch silently past the deadline rather than
/// blocking the caller any longer, then non-blockingly surfaces at most one
/// pending error reported by the batcher since the last call.
pub(crate) async fn write(
    tx: &mpsc::Sender<MeasurementBatch>,
    last_error_rx: &Mutex<mpsc::Receiver<WriterError>>,
    cancel: &CancellationToken,
    batch: MeasurementBatch,
) -> Result<(), WriterError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        outcome = tokio::time::timeout(WRITE_TIMEOUT, tx.send(batch)) => {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {}
                Err(_) => warn!("ingestion queue full for {}s, dropping batch", WRITE_TIMEOUT.as_secs()),
            }
        }
    }

    match last_error_rx.lock().await.try_recv() {
        Ok(err) => Err(err),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_context_returns_immediately_without_enqueue() {
        let (tx, mut rx) = mpsc::channel(1);
        let (_last_error_tx, last_error_rx) = mpsc::channel(1);
        let last_error_rx = Mutex::new(last_error_rx);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = write(&tx, &last_error_rx, &cancel, vec![]).await;
        assert!(result.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pending_error_is_surfaced_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let (last_error_tx, last_error_rx) = mpsc::channel(1);
        let last_error_rx = Mutex::new(last_error_rx);
        let cancel = CancellationToken::new();

        last_error_tx
            .try_send(WriterError::internal("boom"))
            .unwrap();

        let result = write(&tx, &last_error_rx, &cancel, vec![]).await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_ok());

        let second = write(&tx, &last_error_rx, &cancel, vec![]).await;
        assert!(second.is_ok());
    }
}
