#![no_main]

use libfuzzer_sys::fuzz_target;
use loadmeter::json_output::parse_records;
use loadmeter::merge::merge;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Arbitrary snapshots must either be rejected or merge cleanly
        if let Ok(records) = parse_records(input) {
            let _ = merge(records);
        }
    }
});
