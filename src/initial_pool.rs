//! Bounded thread pool that runs initial-subscribe computes (§5), sized
//! independently of the refresh worker pool so a burst of `subscribe` calls
//! cannot starve ordinary refreshes.
//!
//! Grounded on the teacher's worker-thread pattern (`Mutex` + `Condvar`
//! guarded queue, dedicated OS threads), generalized here to a queue of
//! boxed closures rather than one fixed operation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send>;

struct Inner {
    jobs: VecDeque<Job>,
}

pub struct InitialPool {
    state: Mutex<Inner>,
    not_empty: Condvar,
    stop: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl InitialPool {
    pub fn start(threads: usize) -> Arc<Self> {
        let pool = Arc::new(Self {
            state: Mutex::new(Inner {
                jobs: VecDeque::new(),
            }),
            not_empty: Condvar::new(),
            stop: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        });

        let handles = (0..threads.max(1))
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.run())
            })
            .collect();
        *pool.handles.lock().unwrap() = handles;
        pool
    }

    fn run(&self) {
        loop {
            let job = {
                let mut guard = self.state.lock().unwrap();
                loop {
                    if let Some(job) = guard.jobs.pop_front() {
                        break Some(job);
                    }
                    if self.stop.load(Ordering::Acquire) {
                        break None;
                    }
                    guard = self.not_empty.wait(guard).unwrap();
                }
            };
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }

    /// Enqueue work. Unbounded by design: the pool itself is the bound on
    /// concurrent execution, not on queued-but-not-yet-run jobs, since a
    /// rejected `subscribe` would violate its "never fails synchronously"
    /// contract (§4.2 step 5).
    pub fn submit(&self, job: Job) {
        let mut guard = self.state.lock().unwrap();
        guard.jobs.push_back(job);
        self.not_empty.notify_one();
    }

    pub fn shutdown(&self, wait: bool) {
        self.stop.store(true, Ordering::Release);
        self.not_empty.notify_all();
        if wait {
            let mut handles = self.handles.lock().unwrap();
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
