#![no_main]
use libfuzzer_sys::fuzz_target;

use itergate_core::state::SessionState;
use itergate_engine::state::session::WorkflowSession;

fuzz_target!(|data: &[u8]| {
    if let Ok(state) = serde_json::from_slice::<SessionState>(data) {
        if let Ok(session) = WorkflowSession::from_state(state) {
            assert!(session.history().len() as u32 <= session.max_iterations());
        }
    }
});
