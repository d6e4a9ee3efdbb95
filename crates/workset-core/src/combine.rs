use crate::progress::ProgressEvent;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// Fan in per-repository progress streams and emit a single aggregate
/// stream. Only the earliest stage (in first-seen order) that still has an
/// unfinished repository is reported, so the external indicator never jumps
/// backward while individual repositories race ahead into later stages.
pub fn combine(streams: Vec<Receiver<ProgressEvent>>) -> Receiver<ProgressEvent> {
    let (merged_tx, merged_rx) = mpsc::channel();
    for stream in streams {
        let merged_tx = merged_tx.clone();
        thread::spawn(move || {
            for event in stream {
                if merged_tx.send(event).is_err() {
                    break;
                }
            }
        });
    }
    drop(merged_tx);

    let (out_tx, out_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut state = CombinatorState::default();
        for event in merged_rx {
            if let Some(aggregate) = state.observe(event) {
                if out_tx.send(aggregate).is_err() {
                    return;
                }
            }
        }
        for aggregate in state.drain() {
            if out_tx.send(aggregate).is_err() {
                return;
            }
        }
    });
    out_rx
}

/// Mutable state confined to the combinator's consumer thread.
#[derive(Default)]
struct CombinatorState {
    /// Stage names in first-seen order; append-only while a stage lives.
    stage_order: Vec<String>,
    /// Stage name -> repo -> latest event for that repo in that stage.
    stages: HashMap<String, HashMap<String, ProgressEvent>>,
}

impl CombinatorState {
    fn observe(&mut self, event: ProgressEvent) -> Option<ProgressEvent> {
        // a repo beginning a new stage is finished with every other stage,
        // whether or not the tool emitted a completion marker there
        if event.is_begin {
            self.retire_elsewhere(&event.repo, &event.stage);
        }
        if !self.stages.contains_key(&event.stage) {
            self.stage_order.push(event.stage.clone());
            self.stages.insert(event.stage.clone(), HashMap::new());
        }
        let stage = event.stage.clone();
        let repo = event.repo.clone();
        let ended = event.is_end;
        if let Some(entries) = self.stages.get_mut(&stage) {
            entries.insert(repo.clone(), event);
        }
        let aggregate = self.aggregate_earliest();
        if ended {
            self.remove(&stage, &repo);
        }
        aggregate
    }

    fn retire_elsewhere(&mut self, repo: &str, except: &str) {
        let stale: Vec<String> = self
            .stages
            .iter()
            .filter(|(name, entries)| name.as_str() != except && entries.contains_key(repo))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            self.remove(&name, repo);
        }
    }

    fn remove(&mut self, stage: &str, repo: &str) {
        let emptied = match self.stages.get_mut(stage) {
            Some(entries) => {
                entries.remove(repo);
                entries.is_empty()
            }
            None => return,
        };
        if emptied {
            self.stages.remove(stage);
            self.stage_order.retain(|name| name != stage);
        }
    }

    fn aggregate_earliest(&self) -> Option<ProgressEvent> {
        let stage = self
            .stage_order
            .iter()
            .find(|name| self.stages.get(name.as_str()).is_some_and(|e| !e.is_empty()))?;
        Some(self.aggregate_for(stage, false))
    }

    fn aggregate_for(&self, stage: &str, is_end: bool) -> ProgressEvent {
        let entries = &self.stages[stage];
        let mut current = 0;
        let mut total = 0;
        for event in entries.values() {
            current += event.current;
            total += event.total;
        }
        ProgressEvent {
            repo: format!("{} repos", entries.len()),
            stage: stage.to_string(),
            is_begin: false,
            is_end,
            current,
            total,
        }
    }

    /// Inputs are gone; close out whatever never reported completion so the
    /// output stream only closes with empty state.
    fn drain(&mut self) -> Vec<ProgressEvent> {
        let order = std::mem::take(&mut self.stage_order);
        let mut finals = Vec::new();
        for stage in order {
            if self.stages.get(&stage).is_some_and(|e| !e.is_empty()) {
                finals.push(self.aggregate_for(&stage, true));
            }
            self.stages.remove(&stage);
        }
        finals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Sender;

    fn event(repo: &str, stage: &str, begin: bool, end: bool, cur: u64, tot: u64) -> ProgressEvent {
        ProgressEvent {
            repo: repo.to_string(),
            stage: stage.to_string(),
            is_begin: begin,
            is_end: end,
            current: cur,
            total: tot,
        }
    }

    fn channel_pair() -> (Sender<ProgressEvent>, Receiver<ProgressEvent>) {
        mpsc::channel()
    }

    #[test]
    fn reports_earliest_unfinished_stage_only() {
        // one input stream keeps the arrival order deterministic; the
        // combinator only ever sees the merged order anyway
        let (tx, rx) = channel_pair();
        let combined = combine(vec![rx]);

        tx.send(event("a", "clone", true, false, 1, 10)).unwrap();
        tx.send(event("b", "clone", true, false, 2, 10)).unwrap();
        // repo a races ahead into checkout while b is still cloning
        tx.send(event("a", "clone", false, true, 10, 10)).unwrap();
        tx.send(event("a", "checkout", true, false, 1, 5)).unwrap();
        drop(tx);

        let events: Vec<ProgressEvent> = combined.iter().collect();
        let first_checkout = events
            .iter()
            .position(|e| e.stage == "checkout")
            .expect("checkout eventually surfaces");
        // every aggregate before it reports clone: b's clone entry is
        // still unfinished when a starts checking out
        assert!(first_checkout >= 4);
        for e in &events[..first_checkout] {
            assert_eq!(e.stage, "clone");
        }
        assert!(events[first_checkout..].iter().all(|e| e.stage == "checkout"));
        assert!(events.last().unwrap().is_end);
    }

    #[test]
    fn sums_current_and_total_across_repos() {
        let (tx_a, rx_a) = channel_pair();
        let (tx_b, rx_b) = channel_pair();
        let combined = combine(vec![rx_a, rx_b]);

        tx_a.send(event("a", "clone", true, false, 1, 10)).unwrap();
        tx_b.send(event("b", "clone", true, false, 2, 20)).unwrap();
        drop(tx_a);
        drop(tx_b);

        let events: Vec<ProgressEvent> = combined.iter().collect();
        let last = events.last().unwrap();
        assert_eq!(last.current, 3);
        assert_eq!(last.total, 30);
        assert_eq!(last.repo, "2 repos");
    }

    #[test]
    fn closes_after_draining_unfinished_stages() {
        let (tx, rx) = channel_pair();
        let combined = combine(vec![rx]);
        tx.send(event("a", "clone", true, false, 3, 10)).unwrap();
        drop(tx);

        let events: Vec<ProgressEvent> = combined.iter().collect();
        // stream closed (collect returned) and the stage was closed out
        let last = events.last().unwrap();
        assert_eq!(last.stage, "clone");
        assert!(last.is_end);
    }

    #[test]
    fn end_event_retires_stage_when_empty() {
        let (tx, rx) = channel_pair();
        let combined = combine(vec![rx]);
        tx.send(event("a", "clone", true, false, 1, 2)).unwrap();
        tx.send(event("a", "clone", false, true, 2, 2)).unwrap();
        tx.send(event("a", "checkout", true, false, 1, 4)).unwrap();
        drop(tx);

        let events: Vec<ProgressEvent> = combined.iter().collect();
        // once clone ended, the next aggregate reports checkout
        assert_eq!(events[0].stage, "clone");
        assert_eq!(events[1].stage, "clone");
        assert_eq!(events[2].stage, "checkout");
    }

    #[test]
    fn begin_retires_stale_entries_in_earlier_stages() {
        let (tx, rx) = channel_pair();
        let combined = combine(vec![rx]);
        // the tool never emitted a completion marker for "clone"
        tx.send(event("a", "clone", true, false, 5, 10)).unwrap();
        tx.send(event("a", "checkout", true, false, 1, 4)).unwrap();
        drop(tx);

        let events: Vec<ProgressEvent> = combined.iter().collect();
        assert_eq!(events[0].stage, "clone");
        assert_eq!(events[1].stage, "checkout");
        assert!(!events.iter().any(|e| e.stage == "clone" && e.is_end));
    }

    #[test]
    fn empty_input_set_closes_immediately() {
        let combined = combine(Vec::new());
        assert_eq!(combined.iter().count(), 0);
    }
}
