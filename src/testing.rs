// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory stand-ins for external tools, shared by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::auth::{RateLimiter, TokenAuthority};
use crate::mesh::MeshClient;
use crate::provisioning::PeerProvisioner;
use crate::runner::{CommandOutput, CommandRunner};
use crate::state::AppState;
use crate::storage::Database;
use crate::wireguard::WgInterface;

pub(crate) const TEST_ADMIN: &str = "admin";
pub(crate) const TEST_PASSWORD: &str = "correct-horse-battery";

/// Fully wired application state over a temporary database, a fake
/// WireGuard and a scripted `tailscale`.
pub(crate) struct TestApp {
    pub(crate) state: AppState,
    pub(crate) wg: Arc<FakeWireGuard>,
    pub(crate) tailscale: Arc<ScriptedRunner>,
    pub(crate) db: Arc<Database>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub(crate) fn new() -> Self {
        Self::with_rate_limit(100)
    }

    pub(crate) fn with_rate_limit(requests: u32) -> Self {
        let (db, dir) = crate::storage::database::temp_db();
        let db = Arc::new(db);
        let wg = FakeWireGuard::new();
        let tailscale = ScriptedRunner::new();

        let tokens = TokenAuthority::new(db.clone(), crate::auth::tokens::tests::settings());
        tokens.ensure_user(TEST_ADMIN, TEST_PASSWORD).unwrap();

        let provisioner = PeerProvisioner::new(
            db.clone(),
            WgInterface::new("wg0", wg.clone()),
            "10.8.0.0/24".parse().unwrap(),
            crate::provisioning::tests::server_defaults(),
        );

        let state = AppState::new(
            db.clone(),
            tokens,
            provisioner,
            RateLimiter::new(requests, std::time::Duration::from_secs(60)),
            MeshClient::new(tailscale.clone()),
        )
        .with_cookie_secure(false);

        Self {
            state,
            wg,
            tailscale,
            db,
            _dir: dir,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FakePeer {
    allowed_ips: String,
    endpoint: Option<String>,
    latest_handshake: i64,
    rx: u64,
    tx: u64,
}

#[derive(Default)]
struct FakeState {
    peers: BTreeMap<String, FakePeer>,
    calls: Vec<Vec<String>>,
}

/// Simulates `wg` and `wg-quick` against an in-memory peer table.
#[derive(Default)]
pub(crate) struct FakeWireGuard {
    state: Mutex<FakeState>,
    fail_set: AtomicBool,
    fail_save: AtomicBool,
    fail_revert: AtomicBool,
    fail_dump: AtomicBool,
}

impl FakeWireGuard {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    /// After the next failed save, every `wg set` fails too, so the undo
    /// of the change that preceded the save cannot be applied.
    pub(crate) fn fail_revert(&self, fail: bool) {
        self.fail_revert.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_dump(&self, fail: bool) {
        self.fail_dump.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub(crate) fn has_peer(&self, public_key: &str) -> bool {
        self.state.lock().unwrap().peers.contains_key(public_key)
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.state.lock().unwrap().peers.len()
    }

    /// Pretend the peer completed a handshake from `endpoint`.
    pub(crate) fn set_activity(
        &self,
        public_key: &str,
        endpoint: &str,
        latest_handshake: i64,
        rx: u64,
        tx: u64,
    ) {
        let mut state = self.state.lock().unwrap();
        if let Some(peer) = state.peers.get_mut(public_key) {
            peer.endpoint = Some(endpoint.to_string());
            peer.latest_handshake = latest_handshake;
            peer.rx = rx;
            peer.tx = tx;
        }
    }

    fn dump(state: &FakeState) -> String {
        let mut out = String::from("c2VydmVyLXByaXZhdGU=\tc2VydmVyLXB1YmxpYw==\t51820\toff\n");
        for (key, peer) in &state.peers {
            out.push_str(&format!(
                "{key}\t(none)\t{}\t{}\t{}\t{}\t{}\t25\n",
                peer.endpoint.as_deref().unwrap_or("(none)"),
                peer.allowed_ips,
                peer.latest_handshake,
                peer.rx,
                peer.tx,
            ));
        }
        out
    }
}

#[async_trait]
impl CommandRunner for FakeWireGuard {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        state.calls.push(call);

        let output = match (program, args) {
            ("wg", ["set", _, "peer", key, "remove"]) => {
                if self.fail_set.load(Ordering::SeqCst) {
                    CommandOutput::failed("Unable to modify interface: Operation not permitted")
                } else {
                    state.peers.remove(*key);
                    CommandOutput::ok("")
                }
            }
            ("wg", ["set", _, "peer", key, "allowed-ips", ips]) => {
                if self.fail_set.load(Ordering::SeqCst) {
                    CommandOutput::failed("Unable to modify interface: Operation not permitted")
                } else {
                    state.peers.entry(key.to_string()).or_default().allowed_ips =
                        ips.to_string();
                    CommandOutput::ok("")
                }
            }
            ("wg", ["show", _, "dump"]) => {
                if self.fail_dump.load(Ordering::SeqCst) {
                    CommandOutput::failed("Unable to access interface: No such device")
                } else {
                    CommandOutput::ok(Self::dump(&state))
                }
            }
            ("wg", ["show", name]) => CommandOutput::ok(format!(
                "interface: {name}\n  public key: c2VydmVyLXB1YmxpYw==\n  listening port: 51820\n"
            )),
            ("wg-quick", ["save", _]) => {
                if self.fail_save.load(Ordering::SeqCst) {
                    if self.fail_revert.load(Ordering::SeqCst) {
                        self.fail_set.store(true, Ordering::SeqCst);
                    }
                    CommandOutput::failed("wg-quick: `/etc/wireguard/wg0.conf' is read-only")
                } else {
                    CommandOutput::ok("")
                }
            }
            _ => CommandOutput::failed(format!("unexpected invocation: {program} {args:?}")),
        };
        Ok(output)
    }

    async fn is_available(&self, program: &str) -> bool {
        matches!(program, "wg" | "wg-quick")
    }
}

/// Replays canned output keyed by the joined command line.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    responses: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<String>>,
    available: AtomicBool,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Arc<Self> {
        let runner = Self::default();
        runner.available.store(true, Ordering::SeqCst);
        Arc::new(runner)
    }

    pub(crate) fn respond(&self, command_line: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .insert(command_line.to_string(), output);
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line.clone());

        self.responses
            .lock()
            .unwrap()
            .get(&line)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, line))
    }

    async fn is_available(&self, _program: &str) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
