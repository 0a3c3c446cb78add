//! Mock transport for testing and hardware-free runs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{DeviceTransport, TransportError};
use crate::config::MockConfig;
use crate::protocol::report::ReplyBuilder;
use crate::protocol::{Command, CommandFrame};

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    replies: HashMap<Command, Vec<u8>>,
    sent: Vec<Vec<u8>>,
    pending: Option<Command>,
    connect_attempts: u32,
    failing_connects: u32,
}

/// Mock gauge link
///
/// Answers each command with a scripted reply, or with a built-in report when
/// none is scripted. A [`MockHandle`] lets tests inspect and steer it while a
/// session owns the transport.
pub struct MockTransport {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

/// Shared control over a [`MockTransport`]
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            config: config.clone(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }

    fn default_reply(command: Command) -> Vec<u8> {
        let now = chrono::Local::now().naive_local();
        let builder = ReplyBuilder::new(command, now);
        match command {
            Command::InTankInventory | Command::MassDensityInventory => {
                let mut fields = [0.0f32; 12];
                fields[0] = 12500.0;
                fields[3] = 1450.25;
                fields[5] = 14.5;
                fields[10] = 9375.0;
                fields[11] = 0.75;
                builder.inventory_group(1, &fields).finish()
            }
            _ => builder.finish(),
        }
    }
}

impl MockHandle {
    /// Script the reply for a command
    pub fn set_reply(&self, command: Command, reply: Vec<u8>) {
        self.state.lock().replies.insert(command, reply);
    }

    /// Simulate a dropped link
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().failing_connects = count;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    /// Every frame sent so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::ConnectionFailed("mock connect refused".into()));
        }
        state.connected = true;
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(frame.to_vec());
        state.pending = CommandFrame::command_of(frame);
        Ok(frame.len())
    }

    async fn receive(&mut self, _reply_delay: Duration) -> Result<Vec<u8>, TransportError> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        let command = state
            .pending
            .take()
            .ok_or_else(|| TransportError::Timeout("no command pending".into()))?;
        Ok(state
            .replies
            .get(&command)
            .cloned()
            .unwrap_or_else(|| Self::default_reply(command)))
    }

    async fn is_healthy(&mut self) -> bool {
        self.state.lock().connected
    }

    async fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.pending = None;
    }

    fn endpoint(&self) -> String {
        "mock://gauge".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_inventory, ResponseFrame};

    #[tokio::test]
    async fn test_default_inventory_reply() {
        let mut transport = MockTransport::new(&MockConfig::default());
        transport.connect().await.unwrap();
        transport.send(b"\x01i23100").await.unwrap();

        let reply = transport.receive(Duration::from_secs(4)).await.unwrap();
        let frame = ResponseFrame::new(Command::MassDensityInventory, reply).unwrap();
        let records = parse_inventory(&frame);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].volume, Some(12500.0));
    }

    #[tokio::test]
    async fn test_scripted_reply_and_recorded_frames() {
        let mut transport = MockTransport::new(&MockConfig::default());
        let handle = transport.handle();
        handle.set_reply(Command::MassDensityDelivery, b"\x01i215\x03".to_vec());

        transport.connect().await.unwrap();
        transport.send(b"\x01ABC123i21500").await.unwrap();
        assert_eq!(
            transport.receive(Duration::ZERO).await.unwrap(),
            b"\x01i215\x03"
        );
        assert_eq!(handle.sent_frames(), vec![b"\x01ABC123i21500".to_vec()]);

        // Nothing pending after the reply was consumed
        assert!(matches!(
            transport.receive(Duration::ZERO).await,
            Err(TransportError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_control() {
        let mut transport = MockTransport::new(&MockConfig::default());
        let handle = transport.handle();
        handle.fail_next_connects(2);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(!transport.is_healthy().await);
        transport.connect().await.unwrap();
        assert_eq!(handle.connect_attempts(), 3);
        assert!(transport.is_healthy().await);

        handle.set_connected(false);
        assert!(!transport.is_healthy().await);
        assert!(matches!(
            transport.send(b"\x1B").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_command_of() {
        assert_eq!(CommandFrame::command_of(b"\x01i23100"), Some(Command::MassDensityInventory));
        assert_eq!(CommandFrame::command_of(b"\x01PASSWDi21500"), Some(Command::MassDensityDelivery));
        assert_eq!(CommandFrame::command_of(b"\x1B"), None);
        assert_eq!(CommandFrame::command_of(b"\x01Xi2310"), None);
        assert_eq!(CommandFrame::command_of(b"\x01ii3i3i3i3i3"), None);
    }
}
