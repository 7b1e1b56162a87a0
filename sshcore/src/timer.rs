//! Timer wheel (component B): scheduling for rekey/keepalive/prompts with
//! a skew-tolerant, wraparound-safe 32-bit tick clock.
//!
//! Ticks are compared by wrapping subtraction (`a.wrapping_sub(b) as i32`)
//! rather than `<`, so a rollover of the 32-bit counter never causes a
//! spurious "all timers due at once".

use std::collections::BinaryHeap;
use std::cmp::Ordering;

/// A single scheduled entry: fires `callback` with `ctx` at `deadline`.
struct Entry<Ctx> {
    deadline: u32,
    ctx: Ctx,
    id: u64,
}

impl<Ctx: Eq> PartialEq for Entry<Ctx> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl<Ctx: Eq> Eq for Entry<Ctx> {}

/// Reverse order by deadline (wraparound-aware) so a `BinaryHeap`, which is
/// a max-heap, pops the earliest deadline first.
impl<Ctx: Eq> Ord for Entry<Ctx> {
    fn cmp(&self, other: &Self) -> Ordering {
        tick_cmp(other.deadline, self.deadline).then_with(|| other.id.cmp(&self.id))
    }
}
impl<Ctx: Eq> PartialOrd for Entry<Ctx> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Wraparound-tolerant comparison: `a` is ordered before `b` iff
/// `a.wrapping_sub(b)` is negative when read as `i32`.
fn tick_cmp(a: u32, b: u32) -> Ordering {
    (a.wrapping_sub(b) as i32).cmp(&0)
}

/// `schedule` keys equal `(deadline, ctx)` pairs against the `id` that
/// created them so the "duplicate (fn, ctx, deadline) entries collapse"
/// rule (§4.B) can be enforced without requiring `Ctx: Hash`.
pub struct TimerWheel<Ctx> {
    heap: BinaryHeap<Entry<Ctx>>,
    next_id: u64,
}

impl<Ctx: Eq + Copy> Default for TimerWheel<Ctx> {
    fn default() -> Self {
        TimerWheel { heap: BinaryHeap::new(), next_id: 0 }
    }
}

impl<Ctx: Eq + Copy> TimerWheel<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `ctx` to fire at `now + delay`. Returns the computed
    /// deadline. A duplicate `(ctx, deadline)` pair is not re-inserted.
    pub fn schedule(&mut self, now: u32, delay: u32, ctx: Ctx) -> u32 {
        let deadline = now.wrapping_add(delay);
        if self.heap.iter().any(|e| e.ctx == ctx && e.deadline == deadline) {
            return deadline;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Entry { deadline, ctx, id });
        deadline
    }

    /// Fire every entry whose deadline has passed (`deadline - now <= 0`),
    /// in deadline order, handing each fired `ctx` to `f`. Returns the
    /// next deadline, if any timers remain.
    pub fn run_due<F: FnMut(Ctx)>(&mut self, now: u32, mut f: F) -> Option<u32> {
        while let Some(top) = self.heap.peek() {
            if tick_cmp(top.deadline, now) != Ordering::Greater {
                let entry = self.heap.pop().expect("peeked");
                f(entry.ctx);
            } else {
                break;
            }
        }
        self.heap.peek().map(|e| e.deadline)
    }

    /// Remove every entry carrying `ctx` (session/channel teardown).
    pub fn expire_context(&mut self, ctx: Ctx) {
        let remaining: Vec<_> = self.heap.drain().filter(|e| e.ctx != ctx).collect();
        self.heap.extend(remaining);
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn peek_deadline(&self) -> Option<u32> {
        self.heap.peek().map(|e| e.deadline)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_due_fires_in_deadline_order() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(0, 30, "c");
        wheel.schedule(0, 10, "a");
        wheel.schedule(0, 20, "b");
        let mut fired = Vec::new();
        let next = wheel.run_due(15, |ctx| fired.push(ctx));
        assert_eq!(fired, vec!["a"]);
        assert_eq!(next, Some(20));
    }

    #[test]
    fn duplicate_entries_collapse() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(0, 10, "a");
        wheel.schedule(0, 10, "a");
        let mut count = 0;
        wheel.run_due(100, |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn wraparound_safe_comparison() {
        let mut wheel = TimerWheel::new();
        // now is near the top of u32 range; deadline wraps past zero.
        let now = u32::MAX - 5;
        wheel.schedule(now, 10, "wrapped");
        let mut fired = Vec::new();
        let next = wheel.run_due(now.wrapping_add(3), |ctx| fired.push(ctx));
        assert!(fired.is_empty());
        assert_eq!(next, Some(now.wrapping_add(10)));
        let next = wheel.run_due(now.wrapping_add(11), |ctx| fired.push(ctx));
        assert_eq!(fired, vec!["wrapped"]);
        assert_eq!(next, None);
    }

    #[test]
    fn expire_context_removes_matching_entries() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(0, 10, 1u32);
        wheel.schedule(0, 20, 1u32);
        wheel.schedule(0, 15, 2u32);
        wheel.expire_context(1);
        assert_eq!(wheel.peek_deadline(), Some(15));
    }
}
