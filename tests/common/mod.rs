// Fake single-client daemon for integration tests.
//
// Speaks the framed JSON protocol over loopback TCP. Like the real daemon it
// serves one client at a time, and it keeps the slot reserved for
// `release_delay` after a client leaves. A Hello that arrives while the slot
// is taken is not answered: the socket is dropped, which the client sees as
// a reset or EOF.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use meshlink::codec::{encode_frame, FrameDecoder};
use meshlink::protocol::{decode_body, encode_body, Request, Response};
use meshlink::{ChannelInfo, ChannelRole, Destination, Endpoint, NodeInfo, RadioInfo, TransportError};

pub fn sample_nodes() -> Vec<NodeInfo> {
    vec![
        NodeInfo {
            num: 0xa1b2_c3d4,
            id: "!a1b2c3d4".into(),
            long_name: "Hilltop Relay".into(),
            short_name: "HILL".into(),
            hw_model: Some("RAK4631".into()),
            snr: Some(7.25),
            last_heard: Some(1_760_000_000),
            battery_level: Some(91),
        },
        NodeInfo {
            num: 0x0000_beef,
            id: "!0000beef".into(),
            long_name: "Kitchen".into(),
            short_name: "KTCH".into(),
            hw_model: None,
            snr: None,
            last_heard: None,
            battery_level: None,
        },
    ]
}

pub fn sample_channels() -> Vec<ChannelInfo> {
    vec![
        ChannelInfo {
            index: 0,
            name: String::new(),
            role: ChannelRole::Primary,
        },
        ChannelInfo {
            index: 1,
            name: "ops".into(),
            role: ChannelRole::Secondary,
        },
        ChannelInfo {
            index: 2,
            name: String::new(),
            role: ChannelRole::Disabled,
        },
    ]
}

pub fn sample_radio_info() -> RadioInfo {
    RadioInfo {
        node_num: 0xa1b2_c3d4,
        long_name: "Hilltop Relay".into(),
        short_name: "HILL".into(),
        firmware_version: "2.5.6.abc1234".into(),
        hw_model: "RAK4631".into(),
        region: "EU_868".into(),
        modem_preset: "LONG_FAST".into(),
    }
}

/// A text message the daemon accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SentText {
    pub text: String,
    pub destination: Destination,
    pub channel: u8,
}

#[derive(Debug)]
struct Slot {
    busy: bool,
    free_at: Instant,
}

#[derive(Debug)]
struct State {
    slot: Mutex<Slot>,
    release_delay: Duration,
    connections: AtomicUsize,
    sessions: AtomicUsize,
    overlaps: AtomicUsize,
    early: AtomicUsize,
    next_packet: AtomicU32,
    sent: Mutex<Vec<SentText>>,
}

pub struct FakeDaemon {
    addr: SocketAddr,
    state: Arc<State>,
    stop: Arc<AtomicBool>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl FakeDaemon {
    pub fn start() -> Self {
        Self::with_release_delay(Duration::ZERO)
    }

    pub fn with_release_delay(release_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State {
            slot: Mutex::new(Slot {
                busy: false,
                free_at: Instant::now(),
            }),
            release_delay,
            connections: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
            early: AtomicUsize::new(0),
            next_packet: AtomicU32::new(1000),
            sent: Mutex::new(Vec::new()),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let accept_state = Arc::clone(&state);
        let accept_stop = Arc::clone(&stop);
        let accept_thread = thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&accept_state);
                thread::spawn(move || serve(stream, &state));
            }
        });

        Self {
            addr,
            state,
            stop,
            accept_thread: Some(accept_thread),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.addr.port())
    }

    /// TCP connections accepted, including probes and rejected clients.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Handshakes that claimed the slot.
    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Handshakes rejected because another client held the slot.
    pub fn overlaps(&self) -> usize {
        self.state.overlaps.load(Ordering::SeqCst)
    }

    /// Handshakes rejected because the slot was still being released.
    pub fn early_reconnects(&self) -> usize {
        self.state.early.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.state.sent.lock().unwrap().clone()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the blocking accept.
        let _ = TcpStream::connect_timeout(&self.addr, Duration::from_millis(200));
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

enum Claim {
    Granted,
    Busy,
    Early,
}

fn claim(state: &State) -> Claim {
    let mut slot = state.slot.lock().unwrap();
    if slot.busy {
        return Claim::Busy;
    }
    if Instant::now() < slot.free_at {
        return Claim::Early;
    }
    slot.busy = true;
    Claim::Granted
}

fn release(state: &State) {
    let mut slot = state.slot.lock().unwrap();
    slot.busy = false;
    slot.free_at = Instant::now() + state.release_delay;
}

fn serve(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut claimed = false;
    let _ = converse(&mut stream, state, &mut claimed);
    if claimed {
        release(state);
    }
}

fn reply(stream: &mut TcpStream, response: &Response) -> Result<(), TransportError> {
    stream.write_all(&encode_frame(&encode_body(response)?)?)?;
    Ok(())
}

fn converse(stream: &mut TcpStream, state: &State, claimed: &mut bool) -> Result<(), TransportError> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        for payload in decoder.feed(&buf[..n])? {
            let request: Request = decode_body(&payload)?;
            if !*claimed && !matches!(request, Request::Hello { .. }) {
                reply(stream, &Response::Refused {
                    reason: "handshake required".into(),
                })?;
                return Ok(());
            }
            let response = match request {
                Request::Hello { .. } => match claim(state) {
                    Claim::Granted => {
                        *claimed = true;
                        state.sessions.fetch_add(1, Ordering::SeqCst);
                        Response::Ready
                    }
                    Claim::Busy => {
                        state.overlaps.fetch_add(1, Ordering::SeqCst);
                        return Ok(());
                    }
                    Claim::Early => {
                        state.early.fetch_add(1, Ordering::SeqCst);
                        return Ok(());
                    }
                },
                Request::ListNodes => Response::Nodes { nodes: sample_nodes() },
                Request::ListChannels => Response::Channels {
                    channels: sample_channels(),
                },
                Request::RadioInfo => Response::RadioInfo {
                    info: sample_radio_info(),
                },
                Request::SendText {
                    text,
                    destination,
                    channel,
                } => {
                    state.sent.lock().unwrap().push(SentText {
                        text,
                        destination,
                        channel,
                    });
                    Response::Sent {
                        packet_id: state.next_packet.fetch_add(1, Ordering::SeqCst),
                    }
                }
                Request::Disconnect => return Ok(()),
            };
            reply(stream, &response)?;
        }
    }
}
