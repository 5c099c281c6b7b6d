#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = itergate_core::schema::check(&value, "fuzz.workflow.json", true);
        if let Ok(spec) = serde_json::from_value::<itergate_core::spec::WorkflowSpec>(value) {
            let _ = itergate_engine::gates::evaluator::QualityGateSet::new(spec.gates);
        }
    }
});
