#![no_main]

use libfuzzer_sys::fuzz_target;
use loadmeter::filter::UnitFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // First line is the pattern, the rest are unit names to test
        let mut lines = input.lines();
        let Some(pattern) = lines.next() else {
            return;
        };
        if let Ok(filter) = UnitFilter::from_patterns([pattern]) {
            for unit in lines {
                let _ = filter.allowed(unit);
            }
        }
    }
});
