//! Simulated host side: a transport whose peer is an in-memory RPC proxy
#![allow(dead_code)]

use std::boxed::Box;
use std::cell::{RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use amprpc::config::Config;
use amprpc::core::{ChannelId, FileHandle, OpCode, OpenFlags};
use amprpc::lifecycle::{Manager, Session};
use amprpc::transport::adapter::{
    Callbacks, MAX_PAYLOAD_LEN, SendError, SetupError, Transport,
};
use amprpc::transport::platform::{Platform, PlatformError};
use amprpc::wire::{self, Request, Response};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

pub type TestSession = Session<CriticalSectionRawMutex>;
pub type TestManager = Manager<'static, CriticalSectionRawMutex, MockTransport>;

pub const CHANNEL: ChannelId = ChannelId::new(0x400);

pub const ENOENT: i32 = 2;
pub const EBADF: i32 = 9;
pub const EACCES: i32 = 13;
pub const EEXIST: i32 = 17;

struct OpenFile {
    path: String,
    flags: OpenFlags,
    position: usize,
}

/// RPC proxy state on the host
pub struct HostProxy {
    pub files: HashMap<String, Vec<u8>>,
    handles: HashMap<i32, OpenFile>,
    next_handle: i32,
    pub stdin: VecDeque<u8>,
    pub stdout: Vec<u8>,
    /// Every payload received, including the close-intent token.
    pub received: Vec<Vec<u8>>,
    pub close_intents: usize,
    /// Answer requests from within `send`.
    pub auto_reply: bool,
    /// Replaces the answer to the next request.
    pub next_reply: Option<Vec<u8>>,
    /// Reject every open with `EACCES`.
    pub deny_open: bool,
    /// Send a terminate request instead of answering a console read on empty input.
    pub terminate_when_idle: bool,
    pub fail_register: bool,
    pub announce_on_register: bool,
    pub registered: bool,
    pub unregistered: bool,
    callbacks: Option<Callbacks<'static>>,
}

impl HostProxy {
    fn new() -> Self {
        Self {
            files: HashMap::new(),
            handles: HashMap::new(),
            next_handle: 3,
            stdin: VecDeque::new(),
            stdout: Vec::new(),
            received: Vec::new(),
            close_intents: 0,
            auto_reply: true,
            next_reply: None,
            deny_open: false,
            terminate_when_idle: false,
            fail_register: false,
            announce_on_register: false,
            registered: false,
            unregistered: false,
            callbacks: None,
        }
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Requests received so far, in order, without the close-intent tokens.
    pub fn requests(&self) -> Vec<Request<'_>> {
        self.received
            .iter()
            .filter(|payload| !wire::is_close_intent(payload))
            .map(|payload| Request::decode(payload).unwrap())
            .collect()
    }

    fn serve(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        self.received.push(payload.to_vec());
        if wire::is_close_intent(payload) {
            self.close_intents += 1;
            return None;
        }
        if let Some(reply) = self.next_reply.take() {
            return Some(reply);
        }
        if !self.auto_reply {
            return None;
        }

        let request = Request::decode(payload).ok()?;
        let (opcode, result, data) = match request {
            Request::Open { path, flags, .. } => (OpCode::Open, self.open(path, flags), Vec::new()),
            Request::Read { handle, len } => match self.read(handle, len as usize) {
                Ok(data) => (OpCode::Read, data.len() as i32, data),
                Err(code) => (OpCode::Read, code, Vec::new()),
            },
            Request::Write { handle, data } => (OpCode::Write, self.write(handle, data), Vec::new()),
            Request::Close { handle } => (OpCode::Close, self.close(handle), Vec::new()),
            Request::ConsoleRead { len } => {
                if self.stdin.is_empty() && self.terminate_when_idle {
                    return Some(wire::encode_terminate().to_vec());
                }
                let data = self.read_line(len as usize);
                (OpCode::ConsoleRead, data.len() as i32, data)
            }
            Request::ConsoleWrite { data } => {
                self.stdout.extend_from_slice(data);
                (OpCode::ConsoleWrite, data.len() as i32, Vec::new())
            }
        };
        Some(encode_response(opcode, result, &data))
    }

    fn open(&mut self, path: &str, flags: OpenFlags) -> i32 {
        if self.deny_open {
            return -EACCES;
        }
        let exists = self.files.contains_key(path);
        if exists && flags.contains(OpenFlags::CREAT) && flags.contains(OpenFlags::EXCL) {
            return -EEXIST;
        }
        if !exists {
            if !flags.contains(OpenFlags::CREAT) {
                return -ENOENT;
            }
            self.files.insert(path.to_string(), Vec::new());
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(
            handle,
            OpenFile {
                path: path.to_string(),
                flags,
                position: 0,
            },
        );
        handle
    }

    fn read(&mut self, handle: FileHandle, len: usize) -> Result<Vec<u8>, i32> {
        let file = self.handles.get_mut(&handle.into_i32()).ok_or(-EBADF)?;
        let content = &self.files[&file.path];
        let start = file.position.min(content.len());
        let end = (start + len).min(content.len());
        file.position = end;
        Ok(content[start..end].to_vec())
    }

    fn write(&mut self, handle: FileHandle, data: &[u8]) -> i32 {
        let Some(file) = self.handles.get_mut(&handle.into_i32()) else {
            return -EBADF;
        };
        if file.flags.access_mode() == OpenFlags::RDONLY {
            return -EBADF;
        }
        let content = self.files.get_mut(&file.path).unwrap();
        if file.flags.contains(OpenFlags::APPEND) {
            content.extend_from_slice(data);
        } else {
            let end = file.position + data.len();
            if content.len() < end {
                content.resize(end, 0);
            }
            content[file.position..end].copy_from_slice(data);
            file.position = end;
        }
        data.len() as i32
    }

    fn close(&mut self, handle: FileHandle) -> i32 {
        match self.handles.remove(&handle.into_i32()) {
            Some(_) => 0,
            None => -EBADF,
        }
    }

    // Line-buffered terminal: one line per read, at most `len` bytes
    fn read_line(&mut self, len: usize) -> Vec<u8> {
        let line = self
            .stdin
            .iter()
            .position(|&byte| byte == b'\n')
            .map_or(self.stdin.len(), |pos| pos + 1);
        self.stdin.drain(..line.min(len)).collect()
    }
}

pub fn encode_response(opcode: OpCode, result: i32, data: &[u8]) -> Vec<u8> {
    let response = Response {
        opcode,
        result,
        data,
    };
    response.to_message().unwrap().to_vec()
}

/// Shared handle to the simulated host
#[derive(Clone)]
pub struct Host(Rc<RefCell<HostProxy>>);

impl Host {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(HostProxy::new())))
    }

    pub fn with_stdin(input: &str) -> Self {
        let host = Self::new();
        host.proxy().stdin.extend(input.bytes());
        host
    }

    pub fn proxy(&self) -> RefMut<'_, HostProxy> {
        self.0.borrow_mut()
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport { host: self.clone() }
    }

    fn callbacks(&self) -> Callbacks<'static> {
        self.proxy().callbacks.expect("transport not registered")
    }

    /// Acknowledges the channel announcement, as the transport interrupt would.
    pub fn announce(&self) {
        self.callbacks().channel_created(CHANNEL);
    }

    pub fn delete_channel(&self) {
        self.callbacks().channel_deleted(CHANNEL);
    }

    pub fn terminate(&self) {
        self.deliver(&wire::encode_terminate());
    }

    /// Delivers a raw payload on the channel.
    pub fn deliver(&self, payload: &[u8]) {
        self.callbacks().received(CHANNEL, payload);
    }
}

pub struct MockTransport {
    host: Host,
}

impl Transport<'static> for MockTransport {
    fn register(&mut self, callbacks: Callbacks<'static>) -> Result<(), SetupError> {
        let announce = {
            let mut proxy = self.host.proxy();
            if proxy.fail_register {
                return Err(SetupError::Device);
            }
            proxy.registered = true;
            proxy.callbacks = Some(callbacks);
            proxy.announce_on_register
        };
        if announce {
            callbacks.channel_created(CHANNEL);
        }
        Ok(())
    }

    fn send(&mut self, channel: ChannelId, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SendError::PayloadTooLarge);
        }
        let (reply, callbacks) = {
            let mut proxy = self.host.proxy();
            if !proxy.registered || proxy.unregistered {
                return Err(SendError::NotRegistered);
            }
            if channel != CHANNEL {
                return Err(SendError::UnknownChannel);
            }
            (proxy.serve(payload), proxy.callbacks)
        };
        // The reply interrupt fires before send returns
        if let (Some(reply), Some(callbacks)) = (reply, callbacks) {
            callbacks.received(channel, &reply);
        }
        Ok(())
    }

    fn unregister(&mut self) {
        let mut proxy = self.host.proxy();
        proxy.unregistered = true;
        proxy.callbacks = None;
    }
}

#[derive(Default)]
pub struct MockPlatform {
    pub fail: bool,
}

impl Platform for MockPlatform {
    fn init(&mut self) -> Result<(), PlatformError> {
        match self.fail {
            true => Err(PlatformError::InterruptController),
            false => Ok(()),
        }
    }
}

pub fn leak_session() -> &'static TestSession {
    Box::leak(Box::new(Session::new()))
}

pub fn new_manager(host: &Host, config: Config) -> TestManager {
    Manager::new(leak_session(), host.transport(), config)
}

/// Manager with an established channel
pub fn ready_manager(host: &Host, config: Config) -> TestManager {
    let mut manager = new_manager(host, config);
    manager.start().unwrap();
    host.announce();
    assert_eq!(manager.wait_ready_blocking(), Ok(CHANNEL));
    manager
}
