//! Polling session state machine

use std::time::Duration;

use chrono::Local;
use tank_core::{MeasurementRecord, TransferRecord};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{PollingOptions, SessionState, TickResult};
use crate::config::DeviceConfig;
use crate::error::VeederResult;
use crate::protocol::{parse_delivery, parse_inventory, Command, CommandFrame, ResponseFrame};
use crate::transport::{round_trip, DeviceTransport};

/// Periodic driver for one gauge link
///
/// Owns the transport. Runs until its cancellation token fires.
pub struct PollingSession {
    device: DeviceConfig,
    options: PollingOptions,
    transport: Box<dyn DeviceTransport>,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    inventory_frame: CommandFrame,
    delivery_frame: CommandFrame,
}

impl PollingSession {
    /// Create a session; fails when the device's command frames cannot be built
    pub fn new(
        device: DeviceConfig,
        options: PollingOptions,
        transport: Box<dyn DeviceTransport>,
        cancel: CancellationToken,
    ) -> VeederResult<Self> {
        let inventory_frame = device.frame(device.inventory_command.command())?;
        let delivery_frame = device.frame(Command::MassDensityDelivery)?;
        let (state_tx, _) = watch::channel(SessionState::Disconnected);

        Ok(Self {
            device,
            options,
            transport,
            cancel,
            state_tx,
            inventory_frame,
            delivery_frame,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Run until cancelled, invoking `on_tick` after every completed tick
    pub async fn run<F>(mut self, mut on_tick: F)
    where
        F: FnMut(TickResult) + Send,
    {
        info!(
            endpoint = %self.transport.endpoint(),
            tank_id = self.device.tank_id,
            period = ?self.options.period,
            "Polling session starting"
        );

        if self.connect_loop().await {
            loop {
                if self.cancel.is_cancelled() {
                    break;
                }
                let started = Instant::now();

                if self.transport.is_healthy().await {
                    match self.tick(started).await {
                        Some(result) => on_tick(result),
                        None => break,
                    }
                } else {
                    error!(endpoint = %self.transport.endpoint(), "Lost connection to gauge");
                    self.transport.disconnect().await;
                    self.set_state(SessionState::ReconnectWait);
                    if !self.pause(self.options.reconnect_wait).await {
                        break;
                    }
                    if !self.connect_loop().await {
                        break;
                    }
                }

                let remaining = self.options.period.saturating_sub(started.elapsed());
                if !self.pause(remaining).await {
                    break;
                }
            }
        }

        self.transport.disconnect().await;
        self.set_state(SessionState::Stopped);
        info!("Polling session stopped");
    }

    /// Connect with retry; false when cancelled first
    async fn connect_loop(&mut self) -> bool {
        self.set_state(SessionState::Connecting);
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            attempt += 1;
            match self.transport.connect().await {
                Ok(()) => {
                    info!(endpoint = %self.transport.endpoint(), attempt, "Connected to gauge");
                    self.set_state(SessionState::Polling);
                    return true;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        "Connect failed, retrying in {:?}", self.options.connect_retry_delay
                    );
                }
            }
            if !self.pause(self.options.connect_retry_delay).await {
                return false;
            }
        }
    }

    /// One inventory and one delivery round trip; None when cancelled mid-tick
    async fn tick(&mut self, started: Instant) -> Option<TickResult> {
        debug!("Tick");
        let measurements = self.poll_inventory().await;
        if self.cancel.is_cancelled() {
            return None;
        }
        if !self.pause(self.options.settle_delay).await {
            return None;
        }
        let transfers = self.poll_deliveries().await;
        if self.cancel.is_cancelled() {
            return None;
        }

        Some(TickResult {
            measurements,
            transfers,
            elapsed: started.elapsed(),
        })
    }

    async fn poll_inventory(&mut self) -> Vec<MeasurementRecord> {
        let frame = self.inventory_frame.clone();
        let Some(reply) = self.exchange(&frame).await else {
            return Vec::new();
        };
        let tank_id = self.device.tank_id;
        let captured_at = Local::now().naive_local();
        parse_inventory(&reply)
            .into_iter()
            .map(|r| r.with_tank_id(tank_id).with_capture_time(captured_at))
            .collect()
    }

    async fn poll_deliveries(&mut self) -> Vec<TransferRecord> {
        let frame = self.delivery_frame.clone();
        let Some(reply) = self.exchange(&frame).await else {
            return Vec::new();
        };
        let tank_id = self.device.tank_id;
        let captured_at = Local::now().naive_local();
        parse_delivery(&reply)
            .into_iter()
            .map(|r| r.with_tank_id(tank_id).with_capture_time(captured_at))
            .collect()
    }

    async fn exchange(&mut self, frame: &CommandFrame) -> Option<ResponseFrame> {
        let bytes = round_trip(
            self.transport.as_mut(),
            frame,
            self.device.log_transmission,
        )
        .await;
        if bytes.is_empty() {
            debug!(command = %frame.command(), "No reply");
            return None;
        }
        match ResponseFrame::new(frame.command(), bytes) {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!(command = %frame.command(), error = %e, "Reply discarded");
                None
            }
        }
    }

    /// Sleep unless cancelled; false when cancelled
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Session state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MockConfig, TransportConfig};
    use crate::protocol::report::{DeliveryEntry, ReplyBuilder};
    use crate::protocol::TIMESTAMP_OFFSET;
    use crate::transport::mock::{MockHandle, MockTransport};
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn device() -> DeviceConfig {
        DeviceConfig {
            tank_id: 42,
            tank_index: 1,
            password: None,
            log_transmission: false,
            inventory_command: Default::default(),
            transport: TransportConfig::Mock(MockConfig::default()),
        }
    }

    fn scripted_transport(latency_ms: u64) -> (MockTransport, MockHandle) {
        let transport = MockTransport::new(&MockConfig { latency_ms });
        let handle = transport.handle();
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap();

        let mut fields = [0.0f32; 12];
        fields[0] = 1000.0;
        fields[11] = 0.75;
        handle.set_reply(
            Command::MassDensityInventory,
            ReplyBuilder::new(Command::MassDensityInventory, ts)
                .inventory_group(1, &fields)
                .finish(),
        );
        let entry = DeliveryEntry::new(ts, ts, (100.0, 500.0), (80.0, 400.0));
        handle.set_reply(
            Command::MassDensityDelivery,
            ReplyBuilder::new(Command::MassDensityDelivery, ts)
                .delivery_group(1, &[entry])
                .finish(),
        );
        (transport, handle)
    }

    /// Run a session, stopping it after `ticks` callbacks; returns (tick, time) pairs
    async fn run_ticks(
        transport: MockTransport,
        options: PollingOptions,
        ticks: usize,
        mut on_tick: impl FnMut(usize) + Send + 'static,
    ) -> Vec<(TickResult, Instant)> {
        let cancel = CancellationToken::new();
        let session =
            PollingSession::new(device(), options, Box::new(transport), cancel.clone()).unwrap();
        let state = session.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let stop = cancel.clone();

        session
            .run(move |result| {
                let mut seen = sink.lock();
                seen.push((result, Instant::now()));
                on_tick(seen.len());
                if seen.len() >= ticks {
                    stop.cancel();
                }
            })
            .await;

        assert_eq!(*state.borrow(), SessionState::Stopped);
        let out = seen.lock().clone();
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_collects_and_stamps_records() {
        let (transport, handle) = scripted_transport(0);
        let ticks = run_ticks(transport, PollingOptions::default(), 1, |_| {}).await;

        assert_eq!(ticks.len(), 1);
        let result = &ticks[0].0;
        assert_eq!(result.measurements.len(), 1);
        assert_eq!(result.measurements[0].tank_id, 42);
        assert_eq!(result.measurements[0].volume, Some(1000.0));
        assert_eq!(result.transfers.len(), 1);
        assert_eq!(result.transfers[0].tank_id, 42);
        assert_eq!(result.transfers[0].volume, 400.0);
        assert_eq!(result.elapsed, Duration::from_millis(500));

        assert_eq!(
            handle.sent_frames(),
            vec![b"\x01i23101".to_vec(), b"\x01i21501".to_vec()]
        );
        assert!(!handle.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undated_report_takes_capture_time() {
        let (transport, handle) = scripted_transport(0);
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap();
        let entry = DeliveryEntry::new(ts, ts, (100.0, 500.0), (80.0, 400.0));
        let mut reply = ReplyBuilder::new(Command::MassDensityDelivery, ts)
            .delivery_group(1, &[entry])
            .finish();
        // month 99
        reply[TIMESTAMP_OFFSET + 2..TIMESTAMP_OFFSET + 4].copy_from_slice(b"99");
        handle.set_reply(Command::MassDensityDelivery, reply);

        let before = Local::now().naive_local();
        let ticks = run_ticks(transport, PollingOptions::default(), 1, |_| {}).await;
        let after = Local::now().naive_local();

        let result = &ticks[0].0;
        let report_time = result.transfers[0].report_time.unwrap();
        assert!(before <= report_time && report_time <= after);
        assert_eq!(result.transfers[0].start_time, Some(ts));
        assert_eq!(result.measurements[0].timestamp, Some(ts));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_paced_to_period() {
        // Each receive takes 3s, so a tick takes 6.5s
        let (transport, _handle) = scripted_transport(3000);
        let ticks = run_ticks(transport, PollingOptions::default(), 3, |_| {}).await;

        assert_eq!(ticks[0].0.elapsed, Duration::from_millis(6500));
        assert_eq!(ticks[1].1 - ticks[0].1, Duration::from_secs(10));
        assert_eq!(ticks[2].1 - ticks[1].1, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_tick_starts_next_immediately() {
        // 2 x 6s receive + 0.5s settle = 12.5s, longer than the period
        let (transport, _handle) = scripted_transport(6000);
        let ticks = run_ticks(transport, PollingOptions::default(), 2, |_| {}).await;

        assert_eq!(ticks[1].1 - ticks[0].1, Duration::from_millis(12500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_every_minute() {
        let (transport, handle) = scripted_transport(0);
        handle.fail_next_connects(2);
        let start = Instant::now();
        let ticks = run_ticks(transport, PollingOptions::default(), 1, |_| {}).await;

        assert_eq!(handle.connect_attempts(), 3);
        assert!(ticks[0].1 - start >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_link_waits_and_reconnects() {
        let (transport, handle) = scripted_transport(0);
        let control = handle.clone();
        let ticks = run_ticks(transport, PollingOptions::default(), 2, move |n| {
            if n == 1 {
                control.set_connected(false);
            }
        })
        .await;

        assert_eq!(ticks.len(), 2);
        assert_eq!(handle.connect_attempts(), 2);
        // 10s to the unhealthy tick, 30s reconnect wait, then the tick after it
        assert!(ticks[1].1 - ticks[0].1 >= Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_connecting() {
        let (transport, handle) = scripted_transport(0);
        handle.fail_next_connects(u32::MAX);
        let cancel = CancellationToken::new();
        let session =
            PollingSession::new(device(), PollingOptions::default(), Box::new(transport), cancel.clone())
                .unwrap();
        let state = session.subscribe();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            stopper.cancel();
        });

        let mut calls = 0;
        session.run(|_| calls += 1).await;

        assert_eq!(calls, 0);
        assert_eq!(handle.connect_attempts(), 3);
        assert_eq!(*state.borrow(), SessionState::Stopped);
    }

    #[test]
    fn test_new_rejects_bad_password() {
        let mut config = device();
        config.password = Some("abc".into());
        let transport = MockTransport::new(&MockConfig::default());
        let result = PollingSession::new(
            config,
            PollingOptions::default(),
            Box::new(transport),
            CancellationToken::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_initial_state() {
        let transport = MockTransport::new(&MockConfig::default());
        let session = PollingSession::new(
            device(),
            PollingOptions::default(),
            Box::new(transport),
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
