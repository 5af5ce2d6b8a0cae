//! Deterministic environment for unit tests inside this crate.
//!
//! Integration tests use the harness `SimEnv`; this stays local so unit
//! tests do not depend on a crate that depends on us.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use veilfeed_proto::Timestamp;

use crate::env::{EntropyError, Environment};

#[derive(Clone)]
pub(crate) struct TestEnv {
    state: Arc<Mutex<State>>,
    failing: bool,
}

struct State {
    counter: u64,
    scripted: VecDeque<[u8; 32]>,
}

impl TestEnv {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State { counter: seed, scripted: VecDeque::new() })),
            failing: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self { failing: true, ..Self::new(0) }
    }

    /// 32-byte draws come from `draws` first, then from the counter.
    pub(crate) fn scripted(draws: Vec<[u8; 32]>) -> Self {
        let env = Self::new(0);
        env.state.lock().unwrap().scripted = draws.into();
        env
    }
}

impl Environment for TestEnv {
    fn unix_time(&self) -> Timestamp {
        1_700_000_000
    }

    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        if self.failing {
            return Err(EntropyError { reason: "test entropy disabled".to_string() });
        }

        let mut state = self.state.lock().unwrap();
        if buffer.len() == 32 {
            if let Some(draw) = state.scripted.pop_front() {
                buffer.copy_from_slice(&draw);
                return Ok(());
            }
        }

        for byte in buffer.iter_mut() {
            // splitmix64
            state.counter = state.counter.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = state.counter;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            *byte = (z ^ (z >> 31)) as u8;
        }
        Ok(())
    }
}
