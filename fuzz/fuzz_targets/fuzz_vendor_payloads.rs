#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    // Every vendor payload parser must reject garbage without panicking
    let _ = evsolar::telemetry::power::parse_aggregates(body);
    let _ = evsolar::telemetry::power::parse_soe(body);
    let _ = evsolar::telemetry::power::parse_solaredge_solar(body);
    let _ = evsolar::telemetry::power::parse_solaredge_reserve(body);
    let _ = evsolar::emporia::types::select_charger(body, None);
    let _ = evsolar::emporia::types::parse_usage_watts(body);
    let _ = evsolar::emporia::parse_auth_response(body);
    let _ = evsolar::schedule::parse_sunrise_response(body);
});
