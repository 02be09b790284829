//! Action chains and the pending-action queue.
//!
//! A chain is the consequence side of a contingency: up to six steps, each
//! either immediate (offset 0) or deferred by a per-step offset.  Deferred
//! steps wait in a fixed eight-slot queue keyed by absolute execute time.

use crate::devices::DeviceId;
use heapless::Vec;
use log::warn;

pub const MAX_CHAIN_STEPS: usize = 6;
pub const MAX_PENDING: usize = 8;

/// What a chain step does when it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Activate the target output for `param` ms.
    ActivateDevice,
    /// Start a timeout window of `param` ms on the target lever.
    SetTimeout,
    /// Reset every trigger's runtime state.
    ResetTriggers,
    /// Placeholder step, skipped at fire time.
    None,
}

/// One chain step.  `Copy` so chains can be walked while the scheduler
/// mutates itself executing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub target: DeviceId,
    /// Delay from the trigger fire time; 0 executes inline.
    pub offset_ms: u32,
    /// Duration for `ActivateDevice`, timeout length for `SetTimeout`.
    pub param: u32,
}

impl Action {
    pub const fn none() -> Self {
        Self {
            kind: ActionKind::None,
            target: DeviceId::Cue,
            offset_ms: 0,
            param: 0,
        }
    }
}

/// An ordered set of steps fired together by one trigger.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    pub steps: Vec<Action, MAX_CHAIN_STEPS>,
}

impl Chain {
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingAction {
    action: Action,
    execute_at: u32,
}

/// Fixed-capacity queue of deferred chain steps.
///
/// When every slot is occupied a new step is dropped rather than blocking
/// the tick loop; timeout spacing between rewards makes this rare.
#[derive(Debug)]
pub struct PendingQueue {
    slots: [Option<PendingAction>; MAX_PENDING],
}

impl PendingQueue {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_PENDING],
        }
    }

    /// Park `action` to run at absolute time `execute_at`.
    pub fn schedule(&mut self, action: Action, execute_at: u32) {
        for slot in &mut self.slots {
            if slot.is_none() {
                *slot = Some(PendingAction { action, execute_at });
                return;
            }
        }
        warn!("pending queue full, dropping step at t={execute_at}");
    }

    /// Remove and return every action due at `now`, in slot order.
    pub fn take_due(&mut self, now: u32) -> Vec<Action, MAX_PENDING> {
        let mut due = Vec::new();
        for slot in &mut self.slots {
            if let Some(p) = slot {
                if now >= p.execute_at {
                    // Capacity matches the slot count, push cannot fail.
                    let _ = due.push(p.action);
                    *slot = None;
                }
            }
        }
        due
    }

    pub fn clear(&mut self) {
        self.slots = [None; MAX_PENDING];
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn activate(target: DeviceId, param: u32) -> Action {
        Action {
            kind: ActionKind::ActivateDevice,
            target,
            offset_ms: 1000,
            param,
        }
    }

    #[test]
    fn due_actions_execute_once() {
        let mut q = PendingQueue::new();
        q.schedule(activate(DeviceId::Pump, 2000), 5000);
        assert!(q.take_due(4999).is_empty());

        let due = q.take_due(5000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].target, DeviceId::Pump);

        // Slot was freed; the step does not repeat.
        assert!(q.take_due(6000).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn late_tick_still_drains() {
        let mut q = PendingQueue::new();
        q.schedule(activate(DeviceId::Cue, 500), 1000);
        assert_eq!(q.take_due(90_000).len(), 1);
    }

    #[test]
    fn overflow_drops_silently() {
        let mut q = PendingQueue::new();
        for i in 0..MAX_PENDING as u32 + 3 {
            q.schedule(activate(DeviceId::Stim, i), 100 + i);
        }
        assert_eq!(q.len(), MAX_PENDING);

        // Only the first eight survive.
        let due = q.take_due(1_000);
        assert_eq!(due.len(), MAX_PENDING);
        assert!(due.iter().all(|a| a.param < MAX_PENDING as u32));
    }

    #[test]
    fn clear_empties_all_slots() {
        let mut q = PendingQueue::new();
        q.schedule(activate(DeviceId::Pump, 1), 100);
        q.schedule(activate(DeviceId::Cue, 2), 200);
        q.clear();
        assert!(q.is_empty());
        assert!(q.take_due(10_000).is_empty());
    }

    #[test]
    fn drains_in_slot_order() {
        let mut q = PendingQueue::new();
        q.schedule(activate(DeviceId::Cue, 1), 300);
        q.schedule(activate(DeviceId::Pump, 2), 100);
        let due = q.take_due(300);
        assert_eq!(due[0].param, 1);
        assert_eq!(due[1].param, 2);
    }
}
