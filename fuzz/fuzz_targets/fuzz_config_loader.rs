#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = stepper_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated config must yield its derived views without error.
            let _ = cfg.ports().expect("validated ports");
            let _ = cfg.sim_connected().expect("validated sim.connected");
            let _ = cfg.pin_map().expect("validated pins");
        }
    }
});
