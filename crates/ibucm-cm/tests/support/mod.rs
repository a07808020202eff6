//! Scripted stand-in for the kernel side of the ucm device.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use ibucm_channel::{ChannelError, Device};
use ibucm_cm::ConnectionManager;
use ibucm_wire::{
    Command, EventBody, EventKind, EventResponse, IdAttributes, Opcode, Presence, Slot,
};

/// One command as the kernel saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub data: Option<Vec<u8>>,
    pub info: Option<Vec<u8>>,
    pub primary_path: Option<Vec<u8>>,
    pub alternate_path: Option<Vec<u8>>,
}

struct KernelId {
    uid: u64,
    delivered: u32,
}

struct Queued {
    response: EventResponse,
    data: Option<Vec<u8>>,
    info: Option<Vec<u8>>,
    counts_against: u32,
}

#[derive(Default)]
struct State {
    next_id: u32,
    ids: HashMap<u32, KernelId>,
    queue: VecDeque<Queued>,
    recorded: Vec<Recorded>,
    short_write: Option<usize>,
    hung_up: bool,
}

#[derive(Default)]
pub struct FakeKernel {
    state: Mutex<State>,
    ready: Condvar,
}

fn read_u32(payload: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&payload[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(payload: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&payload[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn fill(command: &mut Command, slot: Slot, bytes: &[u8]) {
    if let Some(out) = command.output_mut(slot) {
        let len = bytes.len().min(out.len());
        out[..len].copy_from_slice(&bytes[..len]);
    }
}

impl FakeKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_id: 100,
                ..State::default()
            }),
            ready: Condvar::new(),
        })
    }

    /// Manager wired to `kernel`.
    pub fn manager(kernel: &Arc<Self>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(Arc::clone(kernel)))
    }

    /// The next command accepts only `written` bytes.
    pub fn short_write_next(&self, written: usize) {
        self.state.lock().unwrap().short_write = Some(written);
    }

    /// Every later readiness wait fails as on a hung-up descriptor.
    pub fn hang_up(&self) {
        self.state.lock().unwrap().hung_up = true;
        self.ready.notify_all();
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().recorded.clone()
    }

    pub fn last(&self, opcode: Opcode) -> Option<Recorded> {
        self.recorded().into_iter().rev().find(|r| r.opcode == opcode)
    }

    /// Events the kernel has delivered for `handle` so far.
    pub fn delivered(&self, handle: u32) -> u32 {
        let state = self.state.lock().unwrap();
        state.ids.get(&handle).map_or(0, |id| id.delivered)
    }

    fn uid_of(state: &State, handle: u32) -> u64 {
        state.ids.get(&handle).map_or(0, |id| id.uid)
    }

    fn enqueue(&self, queued: Queued) {
        self.state.lock().unwrap().queue.push_back(queued);
        self.ready.notify_all();
    }

    /// Queue a notification for an existing handle, tagged with its uid.
    pub fn push_event(
        &self,
        handle: u32,
        kind: EventKind,
        present: Presence,
        body: EventBody,
        data: Option<Vec<u8>>,
        info: Option<Vec<u8>>,
    ) {
        let uid = Self::uid_of(&self.state.lock().unwrap(), handle);
        self.enqueue(Queued {
            response: EventResponse::new(uid, handle, kind, present, &body),
            data,
            info,
            counts_against: handle,
        });
    }

    /// Queue a notification carrying no tag, only the kernel id.
    pub fn push_untagged(&self, handle: u32, kind: EventKind, body: EventBody) {
        self.enqueue(Queued {
            response: EventResponse::new(0, handle, kind, Presence::NONE, &body),
            data: None,
            info: None,
            counts_against: handle,
        });
    }

    /// Queue a simple status notification.
    pub fn push_status(&self, handle: u32, kind: EventKind, status: u32) {
        self.push_event(
            handle,
            kind,
            Presence::NONE,
            EventBody::Status(status),
            None,
            None,
        );
    }

    /// Queue an inbound request on `listen_handle`. The kernel creates the
    /// child endpoint; its id is returned.
    pub fn push_request(
        &self,
        listen_handle: u32,
        kind: EventKind,
        present: Presence,
        body: EventBody,
        data: Option<Vec<u8>>,
    ) -> u32 {
        let mut state = self.state.lock().unwrap();
        let uid = Self::uid_of(&state, listen_handle);
        let child = state.next_id;
        state.next_id += 1;
        state.ids.insert(
            child,
            KernelId {
                uid: 0,
                delivered: 0,
            },
        );
        state.queue.push_back(Queued {
            response: EventResponse::new(uid, child, kind, present, &body),
            data,
            info: None,
            counts_against: listen_handle,
        });
        drop(state);
        self.ready.notify_all();
        child
    }

    /// Queue a status notification with a raw kind value.
    pub fn push_raw_kind(&self, handle: u32, raw_kind: u32, status: u32, data: Option<Vec<u8>>) {
        let uid = Self::uid_of(&self.state.lock().unwrap(), handle);
        let present = if data.is_some() {
            Presence::DATA
        } else {
            Presence::NONE
        };
        self.enqueue(Queued {
            response: EventResponse::with_raw_kind(uid, handle, raw_kind, present, status),
            data,
            info: None,
            counts_against: handle,
        });
    }

    /// Queue a notification tagged with a uid this process never created.
    pub fn push_foreign(&self, uid: u64, handle: u32) {
        self.enqueue(Queued {
            response: EventResponse::new(
                uid,
                handle,
                EventKind::RtuReceived,
                Presence::NONE,
                &EventBody::Status(0),
            ),
            data: None,
            info: None,
            counts_against: handle,
        });
    }

    fn record(state: &mut State, command: &Command) {
        let input = |slot| command.input(slot).map(<[u8]>::to_vec);
        state.recorded.push(Recorded {
            opcode: command.opcode(),
            payload: command.payload().to_vec(),
            data: input(Slot::Data),
            info: input(Slot::Info),
            primary_path: input(Slot::PrimaryPath),
            alternate_path: input(Slot::AlternatePath),
        });
    }
}

impl Device for FakeKernel {
    fn submit(&self, command: &mut Command) -> ibucm_channel::Result<usize> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, command);
        if let Some(written) = state.short_write.take() {
            return Ok(written);
        }

        let payload = command.payload().to_vec();
        match command.opcode() {
            Opcode::CreateId => {
                let id = state.next_id;
                state.next_id += 1;
                state.ids.insert(
                    id,
                    KernelId {
                        uid: read_u64(&payload, 0),
                        delivered: 0,
                    },
                );
                fill(command, Slot::Response, &id.to_le_bytes());
            }
            Opcode::DestroyId => {
                let id = read_u32(&payload, 8);
                let delivered = state.ids.remove(&id).map_or(0, |k| k.delivered);
                fill(command, Slot::Response, &delivered.to_le_bytes());
            }
            Opcode::AttrId => {
                let id = read_u32(&payload, 8);
                let attr = IdAttributes {
                    service_id: 0x10,
                    service_mask: u64::MAX,
                    local_id: id,
                    remote_id: 0,
                };
                let mut dst = BytesMut::new();
                attr.encode(&mut dst);
                fill(command, Slot::Response, &dst);
            }
            Opcode::SendRep => {
                let uid = read_u64(&payload, 0);
                let id = read_u32(&payload, 16);
                if let Some(k) = state.ids.get_mut(&id) {
                    k.uid = uid;
                }
            }
            Opcode::Event => {
                while state.queue.is_empty() {
                    state = self.ready.wait(state).unwrap();
                }
                let Some(queued) = state.queue.pop_front() else {
                    return Err(ChannelError::Io(std::io::Error::other("queue drained")));
                };
                if let Some(k) = state.ids.get_mut(&queued.counts_against) {
                    k.delivered += 1;
                }
                drop(state);

                let mut dst = BytesMut::new();
                queued.response.encode(&mut dst);
                fill(command, Slot::Response, &dst);
                if let Some(data) = &queued.data {
                    fill(command, Slot::Data, data);
                }
                if let Some(info) = &queued.info {
                    fill(command, Slot::Info, info);
                }
            }
            _ => {}
        }
        Ok(command.wire_len())
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> ibucm_channel::Result<bool> {
        let state = self.state.lock().unwrap();
        let idle = |s: &mut State| s.queue.is_empty() && !s.hung_up;
        let state = match timeout {
            Some(timeout) => self.ready.wait_timeout_while(state, timeout, idle).unwrap().0,
            None => self.ready.wait_while(state, idle).unwrap(),
        };
        if state.hung_up {
            return Err(ChannelError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        Ok(!state.queue.is_empty())
    }

    fn name(&self) -> &str {
        "fake-kernel"
    }
}
