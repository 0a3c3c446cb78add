//! End-to-end tests for the tank agent
//!
//! The tests in `tests/` run the gauge link, the uplink pipeline and the HTTP
//! client together against stand-ins for both ends:
//!
//! - a mock transport or [`FakeGauge`], a TCP listener answering like a gauge
//! - [`FakeIngest`](tank_client::testing::FakeIngest) serving the upload API
//!
//! # Test Structure
//!
//! - `agent_e2e_test.rs` - polling session through pipeline to the fake API
//! - `tcp_gauge_test.rs` - TCP transport against a fake gauge

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use tank_veeder::config::TcpConfig;
use tank_veeder::protocol::report::{DeliveryEntry, ReplyBuilder};
use tank_veeder::{Command, CommandFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct GaugeState {
    replies: HashMap<Command, Vec<u8>>,
    received: Vec<Vec<u8>>,
}

/// TCP listener that answers request frames with scripted replies
///
/// Commands without a scripted reply get no answer, like a gauge that
/// ignores an unknown request.
pub struct FakeGauge {
    addr: SocketAddr,
    state: Arc<Mutex<GaugeState>>,
    handle: JoinHandle<()>,
}

impl FakeGauge {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(GaugeState::default()));

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, accept_state.clone()));
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_reply(&self, command: Command, reply: Vec<u8>) {
        self.state.lock().replies.insert(command, reply);
    }

    /// Every chunk read from clients, in arrival order
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.state.lock().received.clone()
    }

    /// Transport settings pointing at this gauge, without the connect settle
    pub fn tcp_config(&self) -> TcpConfig {
        let mut config = TcpConfig::new(self.addr.ip().to_string(), self.addr.port());
        config.post_connect_settle_ms = 0;
        config
    }
}

impl Drop for FakeGauge {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<GaugeState>>) {
    let mut buf = vec![0u8; 1024];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let request = buf[..n].to_vec();
        let reply = {
            let mut state = state.lock();
            state.received.push(request.clone());
            CommandFrame::command_of(&request).and_then(|c| state.replies.get(&c).cloned())
        };
        if let Some(reply) = reply {
            if socket.write_all(&reply).await.is_err() {
                return;
            }
        }
    }
}

/// Timestamp used by the sample replies
pub fn report_time() -> NaiveDateTime {
    at(10, 30)
}

/// 15 March 2024 at `hour:minute`
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap_or_default()
}

/// Inventory reply for tank 1: 1000 volume, 50 level, 20 degrees, 800 mass, 0.75 density
pub fn inventory_reply() -> Vec<u8> {
    let mut fields = [0.0f32; 12];
    fields[0] = 1000.0;
    fields[3] = 50.0;
    fields[5] = 20.0;
    fields[10] = 800.0;
    fields[11] = 0.75;
    ReplyBuilder::new(Command::MassDensityInventory, report_time())
        .inventory_group(1, &fields)
        .finish()
}

/// Delivery reply for tank 1 with `count` deliveries of 400 volume and 320 mass
pub fn delivery_reply(count: usize) -> Vec<u8> {
    let entries: Vec<_> = (0..count)
        .map(|i| {
            let start = at(8, i as u32);
            let end = at(9, i as u32);
            DeliveryEntry::new(start, end, (1000.0, 1400.0), (800.0, 1120.0))
        })
        .collect();
    ReplyBuilder::new(Command::MassDensityDelivery, report_time())
        .delivery_group(1, &entries)
        .finish()
}
