#![no_main]
use libfuzzer_sys::fuzz_target;

use itergate_engine::report::text;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Whatever parses must render back to something that parses the same.
        if let Ok(summaries) = text::parse_report(s) {
            for summary in summaries {
                let again = text::parse_iteration(&summary.render());
                assert_eq!(again.as_ref(), Ok(&summary));
            }
        }
        let _ = text::parse_gate_results(s);
    }
});
