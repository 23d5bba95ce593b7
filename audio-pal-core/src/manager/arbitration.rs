use std::collections::BTreeMap;

use log::{debug, info, warn};

use super::{ManagerState, ResourceManager};
use crate::models::events::GlobalEvent;
use crate::models::stream_attributes::StreamClass;
use crate::routing::policy::{PolicyDecision, Restrictions};
use crate::stream::RelayHold;

impl ResourceManager {
    /// Records a stream of `class` becoming active (`true`) or inactive, then
    /// re-evaluates the concurrency policy for every affected live stream.
    ///
    /// Returns the policy changes applied; each is also reported to the
    /// global callback.
    pub fn concurrent_stream_status(&self, class: StreamClass, active: bool) -> Vec<PolicyDecision> {
        debug!("concurrent stream status {} active {}", class, active);
        let mut holds = Vec::new();
        let decisions = {
            let mut state = self.state.write();
            state.prune_dead();
            if !state.concurrency.update(class, active) {
                warn!("deactivation of {} with no active streams, count stays at 0", class);
            }
            self.reconcile(&state, &mut holds)
        };
        self.publish(&decisions);
        decisions
    }

    /// Logs `decisions` and reports each to the global callback. Must not be
    /// called with the state lock held.
    pub(super) fn publish(&self, decisions: &[PolicyDecision]) {
        for decision in decisions {
            info!(
                "policy {:?} {} on stream {} ({})",
                decision.action,
                if decision.engaged { "engaged" } else { "released" },
                decision.stream,
                decision.class
            );
            self.emit(GlobalEvent::PolicyApplied(*decision));
        }
    }

    /// Active stream count for `class`.
    pub fn active_count(&self, class: StreamClass) -> u32 {
        self.state.read().concurrency.count(class)
    }

    /// Every class with at least one active stream.
    pub fn concurrency_snapshot(&self) -> BTreeMap<StreamClass, u32> {
        self.state.read().concurrency.snapshot()
    }

    /// Brings every live stream of a policy target class in line with the
    /// restrictions the current counts call for. Session events raised on
    /// the way stay queued until `holds` is dropped.
    pub(super) fn reconcile(
        &self,
        state: &ManagerState,
        holds: &mut Vec<RelayHold>,
    ) -> Vec<PolicyDecision> {
        let mut decisions = Vec::new();
        for stream in state.live_streams() {
            let class = stream.attributes().class();
            if !self.policy.is_target(class) {
                continue;
            }
            holds.push(stream.hold_events());
            let desired = if stream.is_active() {
                self.policy.restrictions_for(class, &state.concurrency)
            } else {
                Restrictions::default()
            };
            for (action, engaged) in stream.apply_restrictions(desired) {
                decisions.push(PolicyDecision {
                    stream: stream.id(),
                    class,
                    action,
                    engaged,
                });
            }
        }
        decisions
    }
}
