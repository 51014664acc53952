#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(rows) = stepper_config::read_script(data) {
        assert!(!rows.is_empty());
        for row in rows {
            assert!(row.targets().iter().any(Option::is_some));
        }
    }
});
