//! Drives a [`Machine`] against a [`RadioAdapter`]
//!
//! Actions run one at a time, each raced against the supervisor's deadline.
//! Once the machine is terminal its cleanup actions run unraced and their
//! errors are only logged; the outcome is returned exactly once.

use std::collections::VecDeque;
use std::io::Write;

use crate::adapter::RadioAdapter;
use crate::machine::{Action, Event, Machine, Outcome};
use crate::supervisor::Supervisor;
use crate::workflow::{Options, Workflow};

pub async fn run<A, W>(
    workflow: Workflow,
    adapter: &mut A,
    options: &Options,
    out: &mut W,
) -> Outcome
where
    A: RadioAdapter + ?Sized,
    W: Write,
{
    let mut supervisor = Supervisor::arm(workflow.deadline(options));
    let mut machine = Machine::new(workflow);
    let mut queue: VecDeque<Action> = machine.start().into();

    loop {
        let event = match queue.pop_front() {
            Some(Action::Report(peripheral)) => {
                if let Err(e) = writeln!(out, "{peripheral}").and_then(|()| out.flush()) {
                    log::warn!("failed to report {}: {e}", peripheral.id);
                }
                continue;
            }
            Some(action) if machine.is_terminal() => {
                release(adapter, action).await;
                continue;
            }
            Some(action) => tokio::select! {
                biased;
                event = perform(adapter, action) => event,
                _ = supervisor.expired() => Some(Event::DeadlineReached),
            },
            None => {
                if let Some(outcome) = machine.take_outcome() {
                    return outcome;
                }
                tokio::select! {
                    biased;
                    _ = supervisor.expired() => Some(Event::DeadlineReached),
                    event = adapter.next_event() => {
                        Some(event.map(Event::from).unwrap_or(Event::AdapterClosed))
                    }
                }
            }
        };

        if let Some(event) = event {
            queue.extend(machine.handle(event));
        }
    }
}

/// Run one BLE operation and turn its completion into an event
async fn perform<A: RadioAdapter + ?Sized>(adapter: &mut A, action: Action) -> Option<Event> {
    let event = match action {
        Action::StartScan { service } => Event::ScanStarted(adapter.start_scan(service).await),
        Action::Connect { peripheral } => Event::Connected(adapter.connect(&peripheral).await),
        Action::DiscoverServices { service } => {
            Event::ServicesDiscovered(adapter.discover_services(service).await)
        }
        Action::DiscoverCharacteristics {
            service,
            characteristic,
        } => Event::CharacteristicsDiscovered(
            adapter
                .discover_characteristics(service, characteristic)
                .await,
        ),
        Action::Subscribe { characteristic } => {
            Event::Subscribed(adapter.subscribe(characteristic).await)
        }
        Action::Write {
            characteristic,
            payload,
            mode,
        } => Event::WriteCompleted(adapter.write(characteristic, &payload, mode).await),
        action @ (Action::StopScan | Action::Disconnect | Action::Report(_)) => {
            release(adapter, action).await;
            return None;
        }
    };
    Some(event)
}

async fn release<A: RadioAdapter + ?Sized>(adapter: &mut A, action: Action) {
    let result = match action {
        Action::StopScan => adapter.stop_scan().await,
        Action::Disconnect => adapter.disconnect().await,
        other => {
            log::debug!("skipping {other:?} after termination");
            return;
        }
    };
    if let Err(e) = result {
        log::warn!("cleanup failed: {e}");
    }
}
