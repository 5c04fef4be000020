//! The pending reaction of every particle, kept in an indexed binary
//! min-heap so that the next event is found in constant time and any
//! particle's pending time can be changed in logarithmic time.

/// Index of a particle in the arena.
pub type Handle = usize;
/// Simulation time.
pub type SimTime = f64;

/// The next reaction of a particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub handle: Handle,
    pub time: SimTime,
}

/// Indexed min-heap over the pending times, one entry per particle.
/// Particles that will never react carry `f64::INFINITY`.
#[derive(Clone, Debug)]
pub struct EventSchedule {
    times: Vec<SimTime>,
    heap: Vec<Handle>,
    /// Position of each handle in `heap`
    slot: Vec<usize>,
}

impl EventSchedule {
    pub fn new(times: Vec<SimTime>) -> Self {
        let heap: Vec<Handle> = (0..times.len()).collect();
        let slot = heap.clone();
        let mut schedule = EventSchedule { times, heap, slot };
        for idx in (0..schedule.heap.len() / 2).rev() {
            schedule.sift_down(idx);
        }
        schedule
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The earliest pending event, without removing it.
    pub fn next(&self) -> Option<Event> {
        self.heap
            .first()
            .map(|&handle| Event { handle, time: self.times[handle] })
    }

    pub fn time_of(&self, handle: Handle) -> SimTime {
        self.times[handle]
    }

    pub fn reschedule(&mut self, handle: Handle, time: SimTime) {
        let old = std::mem::replace(&mut self.times[handle], time);
        let idx = self.slot[handle];
        if time < old {
            self.sift_up(idx);
        } else {
            self.sift_down(idx);
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.times[self.heap[a]] < self.times[self.heap[b]]
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.slot[self.heap[a]] = a;
        self.slot[self.heap[b]] = b;
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;
            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }
}
