//! Watch-list reconciliation and operator commands against a live supervisor.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{Harness, Script, ScriptedTransport, states};
use parking_lot::Mutex;
use polymarket_ingest::application::ports::{IngestionControl, WatchListError, WatchListPort};
use polymarket_ingest::application::services::{
    CommandIntake, CommandRegistry, ReconcileCommand, ReconcilerConfig, RestartCommand,
    SubscriptionReconciler, TickOutcome,
};
use polymarket_ingest::domain::streaming::{ConnectionState, FeedEvent};
use polymarket_ingest::domain::subscription::WatchedInstrument;
use polymarket_ingest::infrastructure::commands::command_queue;
use polymarket_ingest::infrastructure::polymarket::{Supervisor, SupervisorConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Watch-list whose contents the test can change between ticks.
#[derive(Default)]
struct EditableWatchList {
    entries: Mutex<Vec<WatchedInstrument>>,
}

impl EditableWatchList {
    fn with(ids: &[&str]) -> Arc<Self> {
        let list = Arc::new(Self::default());
        list.set(ids);
        list
    }

    fn set(&self, ids: &[&str]) {
        *self.entries.lock() = ids
            .iter()
            .map(|id| WatchedInstrument::new(*id, format!("market-{id}")))
            .collect();
    }
}

#[async_trait]
impl WatchListPort for EditableWatchList {
    async fn list_monitored_instruments(&self) -> Result<Vec<WatchedInstrument>, WatchListError> {
        Ok(self.entries.lock().clone())
    }
}

struct Rig {
    script: Script,
    events: mpsc::Receiver<FeedEvent>,
    control: Arc<dyn IngestionControl>,
    reconciler: SubscriptionReconciler,
    cancel: CancellationToken,
}

fn rig(watch_list: Arc<EditableWatchList>) -> Rig {
    let (transport, script) = ScriptedTransport::new();
    let (tx, events) = mpsc::channel(1024);
    let cancel = CancellationToken::new();
    let (supervisor, handle) = Supervisor::new(
        transport,
        Arc::clone(&watch_list) as Arc<dyn WatchListPort>,
        SupervisorConfig::default(),
        tx,
        cancel.clone(),
    );
    tokio::spawn(supervisor.run());

    let control: Arc<dyn IngestionControl> = Arc::new(handle);
    let reconciler = SubscriptionReconciler::new(
        watch_list,
        Arc::clone(&control),
        ReconcilerConfig::default(),
    );
    Rig {
        script,
        events,
        control,
        reconciler,
        cancel,
    }
}

async fn until_state(
    events: &mut mpsc::Receiver<FeedEvent>,
    state: ConnectionState,
) -> Vec<FeedEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let done = event == FeedEvent::StateChanged(state);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

fn strings(ids: &[&str]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

#[tokio::test(start_paused = true)]
async fn first_tick_activates_and_a_change_resubscribes() {
    let watch_list = EditableWatchList::with(&["A", "B"]);
    let mut rig = rig(Arc::clone(&watch_list));

    assert_eq!(rig.reconciler.tick().await, TickOutcome::Activated);
    until_state(&mut rig.events, ConnectionState::Listening).await;
    assert_eq!(rig.reconciler.tick().await, TickOutcome::Unchanged);

    watch_list.set(&["A", "C"]);
    assert_eq!(rig.reconciler.tick().await, TickOutcome::Resubscribed);
    let events = until_state(&mut rig.events, ConnectionState::Listening).await;

    assert_eq!(
        states(&events)[..2],
        [ConnectionState::Closing, ConnectionState::Disconnected]
    );
    assert_eq!(
        rig.script.subscriptions(),
        vec![strings(&["A", "B"]), strings(&["A", "C"])]
    );
    assert_eq!(rig.reconciler.tick().await, TickOutcome::Unchanged);
    rig.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn emptied_watch_list_leaves_the_session_alone() {
    let watch_list = EditableWatchList::with(&["A"]);
    let mut rig = rig(Arc::clone(&watch_list));

    rig.reconciler.tick().await;
    until_state(&mut rig.events, ConnectionState::Listening).await;

    watch_list.set(&[]);
    assert_eq!(rig.reconciler.tick().await, TickOutcome::Unchanged);
    assert_eq!(rig.control.live_subscription().len(), 1);
    assert_eq!(rig.script.open_count(), 1);
    rig.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn stopped_supervisor_skips_the_tick() {
    let watch_list = EditableWatchList::with(&["A"]);
    let rig = rig(watch_list);

    rig.cancel.cancel();
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    assert_eq!(rig.reconciler.tick().await, TickOutcome::Skipped);
}

#[tokio::test(start_paused = true)]
async fn restart_command_rebuilds_from_the_watch_list() {
    let watch_list = EditableWatchList::with(&["A"]);
    let mut rig = rig(Arc::clone(&watch_list));
    rig.reconciler.tick().await;
    until_state(&mut rig.events, ConnectionState::Listening).await;

    let registry = CommandRegistry::new()
        .with(
            "restart",
            Arc::new(RestartCommand::new(Arc::clone(&rig.control))),
        )
        .with(
            "reconcile",
            Arc::new(ReconcileCommand::new(rig.reconciler.trigger())),
        );
    let (sender, source) = command_queue(8);
    tokio::spawn(CommandIntake::new(source, registry).run(rig.cancel.clone()));

    watch_list.set(&["B"]);
    sender.enqueue_body(r#"{"command":"restart"}"#).unwrap();
    let events = until_state(&mut rig.events, ConnectionState::Listening).await;

    assert_eq!(
        states(&events)[..2],
        [ConnectionState::Closing, ConnectionState::Disconnected]
    );
    assert_eq!(
        rig.script.subscriptions(),
        vec![strings(&["A"]), strings(&["B"])]
    );
    rig.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn reconcile_command_forces_a_tick() {
    let watch_list = EditableWatchList::with(&["A"]);
    let mut rig = rig(Arc::clone(&watch_list));
    let trigger = rig.reconciler.trigger();
    let control = Arc::clone(&rig.control);
    let cancel = rig.cancel.clone();

    let registry = CommandRegistry::new()
        .with("restart", Arc::new(RestartCommand::new(control)))
        .with("reconcile", Arc::new(ReconcileCommand::new(trigger)));
    let (sender, source) = command_queue(8);
    tokio::spawn(CommandIntake::new(source, registry).run(cancel.clone()));
    tokio::spawn(rig.reconciler.run(cancel.clone()));

    // The first interval tick activates immediately.
    until_state(&mut rig.events, ConnectionState::Listening).await;

    watch_list.set(&["A", "Z"]);
    sender.enqueue_body("reconcile").unwrap();
    until_state(&mut rig.events, ConnectionState::Listening).await;

    assert_eq!(
        rig.script.subscriptions(),
        vec![strings(&["A"]), strings(&["A", "Z"])]
    );
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn harness_and_reconciler_share_the_live_set() {
    let watch_list = common::watch_list(&[("A", "m-a")]);
    let mut h = Harness::start(SupervisorConfig::default(), Arc::clone(&watch_list));
    let reconciler = SubscriptionReconciler::new(
        watch_list,
        Arc::new(h.handle.clone()),
        ReconcilerConfig::default(),
    );

    assert_eq!(reconciler.tick().await, TickOutcome::Activated);
    h.events_until_state(ConnectionState::Listening).await;
    assert_eq!(reconciler.tick().await, TickOutcome::Unchanged);
    h.shutdown().await;
}
