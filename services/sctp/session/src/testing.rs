//! In-memory socket backend and harness for unit tests.

use crate::config::EndpointConfig;
use crate::endpoint::Endpoint;
use crate::events::SctpEvent;
use crate::readiness::InterestRegistry;
use crate::reconnect::Sleeper;
use crate::resolver::{AddressFamily, HostLookup, Resolver};
use crate::socket::{Received, RecvFlags, SocketApi};
use sctp_wire::{
    EventSubscription, InitParams, Linger, Notification, PayloadProtocolId, RtoInfo, SndRcvInfo,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted receive
#[derive(Debug)]
pub(crate) enum Inbound {
    Chunk {
        data: Vec<u8>,
        flags: RecvFlags,
        info: Option<SndRcvInfo>,
    },
    Eof,
    Error(i32),
}

#[derive(Debug)]
pub(crate) struct FakeState {
    pub next_fd: RawFd,
    pub created: Vec<(RawFd, AddressFamily)>,
    pub init_params: HashMap<RawFd, InitParams>,
    pub events: HashMap<RawFd, EventSubscription>,
    pub linger: HashMap<RawFd, Linger>,
    pub rto: HashMap<RawFd, RtoInfo>,
    pub nonblocking: HashSet<RawFd>,
    pub bound: Vec<(RawFd, SocketAddr)>,
    pub listening: Vec<(RawFd, i32)>,
    pub connects: Vec<(RawFd, SocketAddr)>,
    pub connect_results: VecDeque<io::Result<()>>,
    pub accepts: VecDeque<io::Result<SocketAddr>>,
    pub inbound: HashMap<RawFd, VecDeque<Inbound>>,
    pub sent: Vec<(RawFd, Vec<u8>, SndRcvInfo)>,
    pub send_error: Option<i32>,
    pub closed: Vec<RawFd>,
    pub fail_create: bool,
    pub fail_options: bool,
    pub fail_bind: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_fd: 10,
            created: Vec::new(),
            init_params: HashMap::new(),
            events: HashMap::new(),
            linger: HashMap::new(),
            rto: HashMap::new(),
            nonblocking: HashSet::new(),
            bound: Vec::new(),
            listening: Vec::new(),
            connects: Vec::new(),
            connect_results: VecDeque::new(),
            accepts: VecDeque::new(),
            inbound: HashMap::new(),
            sent: Vec::new(),
            send_error: None,
            closed: Vec::new(),
            fail_create: false,
            fail_options: false,
            fail_bind: false,
        }
    }
}

impl FakeState {
    fn allocate(&mut self) -> RawFd {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }

    fn option_result(&self) -> io::Result<()> {
        if self.fail_options {
            Err(io::Error::from_raw_os_error(libc::ENOPROTOOPT))
        } else {
            Ok(())
        }
    }
}

/// Scripted socket backend; clones share state
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSockets {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Result of the next connect call; connects succeed when none is queued
    pub fn push_connect(&self, result: io::Result<()>) {
        self.state().connect_results.push_back(result);
    }

    pub fn push_accept(&self, peer: SocketAddr) {
        self.state().accepts.push_back(Ok(peer));
    }

    pub fn push_data(&self, fd: RawFd, data: &[u8], eor: bool, stream: u16, ppid: u32) {
        let flags = if eor {
            RecvFlags::END_OF_RECORD
        } else {
            RecvFlags::empty()
        };
        let info = SndRcvInfo::outbound(stream, PayloadProtocolId(ppid));
        self.push(
            fd,
            Inbound::Chunk {
                data: data.to_vec(),
                flags,
                info: Some(info),
            },
        );
    }

    pub fn push_notification(&self, fd: RawFd, notification: &Notification) {
        self.push(
            fd,
            Inbound::Chunk {
                data: notification.encode().to_vec(),
                flags: RecvFlags::END_OF_RECORD | RecvFlags::NOTIFICATION,
                info: None,
            },
        );
    }

    pub fn push_eof(&self, fd: RawFd) {
        self.push(fd, Inbound::Eof);
    }

    pub fn push_recv_error(&self, fd: RawFd, errno: i32) {
        self.push(fd, Inbound::Error(errno));
    }

    fn push(&self, fd: RawFd, inbound: Inbound) {
        self.state().inbound.entry(fd).or_default().push_back(inbound);
    }

    pub fn close_count(&self, fd: RawFd) -> usize {
        self.state().closed.iter().filter(|c| **c == fd).count()
    }
}

impl SocketApi for FakeSockets {
    fn create(&mut self, family: AddressFamily) -> io::Result<RawFd> {
        let mut state = self.state();
        if state.fail_create {
            return Err(io::Error::from_raw_os_error(libc::EPROTONOSUPPORT));
        }
        let fd = state.allocate();
        state.created.push((fd, family));
        Ok(fd)
    }

    fn set_init_params(&mut self, fd: RawFd, init: &InitParams) -> io::Result<()> {
        let mut state = self.state();
        state.option_result()?;
        state.init_params.insert(fd, *init);
        Ok(())
    }

    fn set_events(&mut self, fd: RawFd, events: EventSubscription) -> io::Result<()> {
        let mut state = self.state();
        state.option_result()?;
        state.events.insert(fd, events);
        Ok(())
    }

    fn set_linger(&mut self, fd: RawFd, linger: Linger) -> io::Result<()> {
        let mut state = self.state();
        state.option_result()?;
        state.linger.insert(fd, linger);
        Ok(())
    }

    fn set_rto_info(&mut self, fd: RawFd, rto: &RtoInfo) -> io::Result<()> {
        let mut state = self.state();
        state.option_result()?;
        state.rto.insert(fd, *rto);
        Ok(())
    }

    fn set_nonblocking(&mut self, fd: RawFd) -> io::Result<()> {
        self.state().nonblocking.insert(fd);
        Ok(())
    }

    fn bind(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_bind {
            return Err(io::Error::from_raw_os_error(libc::EADDRINUSE));
        }
        state.bound.push((fd, *addr));
        Ok(())
    }

    fn listen(&mut self, fd: RawFd, backlog: i32) -> io::Result<()> {
        self.state().listening.push((fd, backlog));
        Ok(())
    }

    fn accept(&mut self, _fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
        let mut state = self.state();
        let peer = state
            .accepts
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::WouldBlock)))?;
        Ok((state.allocate(), peer))
    }

    fn connect(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
        let mut state = self.state();
        state.connects.push((fd, *addr));
        state.connect_results.pop_front().unwrap_or(Ok(()))
    }

    fn recv(&mut self, fd: RawFd, buf: &mut [u8]) -> io::Result<Received> {
        let next = self.state().inbound.get_mut(&fd).and_then(|q| q.pop_front());
        match next {
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Some(Inbound::Eof) => Ok(Received {
                len: 0,
                flags: RecvFlags::empty(),
                info: None,
            }),
            Some(Inbound::Error(errno)) => Err(io::Error::from_raw_os_error(errno)),
            Some(Inbound::Chunk { data, flags, info }) => {
                assert!(
                    data.len() <= buf.len(),
                    "scripted chunk of {} bytes does not fit a {} byte window",
                    data.len(),
                    buf.len()
                );
                buf[..data.len()].copy_from_slice(&data);
                Ok(Received {
                    len: data.len(),
                    flags,
                    info,
                })
            }
        }
    }

    fn send(&mut self, fd: RawFd, payload: &[u8], info: &SndRcvInfo) -> io::Result<usize> {
        let mut state = self.state();
        if let Some(errno) = state.send_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        state.sent.push((fd, payload.to_vec(), *info));
        Ok(payload.len())
    }

    fn close(&mut self, fd: RawFd) {
        self.state().closed.push(fd);
    }
}

/// Lookup that never resolves, keeping tests off the network
pub(crate) struct NoLookup;

impl HostLookup for NoLookup {
    fn lookup(&self, _name: &str) -> io::Result<Vec<SocketAddr>> {
        Err(io::Error::new(io::ErrorKind::NotFound, "lookups disabled"))
    }
}

/// Records requested sleeps instead of blocking
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(duration);
    }
}

/// Endpoint wired to fakes, with handles for scripting and inspection
pub(crate) struct Harness {
    pub endpoint: Endpoint,
    pub sockets: FakeSockets,
    pub registry: InterestRegistry,
    events: mpsc::UnboundedReceiver<SctpEvent>,
    sleeper: RecordingSleeper,
}

impl Harness {
    pub fn new(config: EndpointConfig) -> Self {
        let sockets = FakeSockets::new();
        let registry = InterestRegistry::new();
        let sleeper = RecordingSleeper::default();
        let (tx, events) = mpsc::unbounded_channel();
        let endpoint = Endpoint::new(
            config,
            Box::new(sockets.clone()),
            Box::new(registry.clone()),
            Box::new(tx),
        )
        .with_sleeper(Box::new(sleeper.clone()))
        .with_resolver(Resolver::with_lookup(Box::new(NoLookup)));
        Self {
            endpoint,
            sockets,
            registry,
            events,
            sleeper,
        }
    }

    /// Events delivered since the last call
    pub fn events(&mut self) -> Vec<SctpEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeper
            .sleeps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Multiplexed-mode configuration with a default peer
pub(crate) fn multi_config() -> EndpointConfig {
    EndpointConfig {
        peer_address: Some("10.0.0.2".to_string()),
        peer_port: Some(2905),
        ..Default::default()
    }
}

/// Single-mode client configuration with a default peer
pub(crate) fn client_config() -> EndpointConfig {
    EndpointConfig {
        simple_mode: true,
        ..multi_config()
    }
}

/// Single-mode server configuration
pub(crate) fn server_config() -> EndpointConfig {
    EndpointConfig {
        simple_mode: true,
        server_mode: true,
        local_port: Some(3868),
        ..Default::default()
    }
}
