use evsolar::emporia::parse_auth_response;
use evsolar::emporia::types::{EvCharger, parse_usage_watts, select_charger};
use evsolar::error::EvSolarError;
use evsolar::telemetry::Source;

const STATUS: &str = r#"{
    "devicesConnected": [{"deviceGid": 1111, "connected": true}],
    "outlets": [],
    "evChargers": [
        {
            "deviceGid": 2222,
            "loadGid": 3333,
            "message": "",
            "status": "Standby",
            "icon": "CarNotConnected",
            "iconLabel": "Off",
            "iconDetailText": "Ready",
            "faultText": "",
            "chargerOn": false,
            "chargingRate": 16,
            "maxChargingRate": 40,
            "offPeakSchedulesEnabled": false
        },
        {
            "deviceGid": 4444,
            "loadGid": 5555,
            "status": "Charging",
            "icon": "CarConnected",
            "iconLabel": "On",
            "iconDetailText": "Charging at 32A",
            "chargerOn": true,
            "chargingRate": 32,
            "maxChargingRate": 48
        }
    ]
}"#;

#[test]
fn first_charger_is_used_without_gid() {
    let charger = select_charger(STATUS, None).unwrap();
    assert_eq!(charger.device_gid, 2222);
    let status = charger.to_status();
    assert!(!status.charger_on);
    assert!(!status.car_connected);
    assert_eq!(status.charging_rate_amps, 16);
}

#[test]
fn configured_gid_selects_charger() {
    let charger = select_charger(STATUS, Some(4444)).unwrap();
    let status = charger.to_status();
    assert!(status.charger_on);
    assert!(status.car_connected);
    assert_eq!(status.label, "Charging / On / Charging at 32A");
}

#[test]
fn unknown_gid_is_fetch_error() {
    let err = select_charger(STATUS, Some(9)).unwrap_err();
    assert!(matches!(
        err,
        EvSolarError::Fetch {
            origin: Source::Charger,
            ..
        }
    ));
    assert!(select_charger(r#"{"evChargers": []}"#, None).is_err());
}

#[test]
fn update_body_keeps_unknown_fields() {
    let charger = select_charger(STATUS, Some(2222)).unwrap();
    let body = serde_json::to_value(charger.with_desired(true, Some(24))).unwrap();
    assert_eq!(body["chargerOn"], true);
    assert_eq!(body["chargingRate"], 24);
    assert_eq!(body["loadGid"], 3333);
    assert_eq!(body["offPeakSchedulesEnabled"], false);

    let back: EvCharger = serde_json::from_value(body).unwrap();
    assert_eq!(back.device_gid, 2222);
}

#[test]
fn usage_sums_nested_channels_in_watts() {
    let body = r#"{"deviceListUsages":{
        "instant":"2024-05-01T12:00:00Z","scale":"1S","energyUnit":"KilowattHours",
        "devices":[{"deviceGid":4444,"channelUsages":[
            {"name":"Main","usage":0.002,"nestedDevices":[
                {"deviceGid":4445,"channelUsages":[{"usage":0.0005,"nestedDevices":[]}]}
            ]},
            {"name":"Empty","usage":null,"nestedDevices":[]}
        ]}]
    }}"#;
    let watts = parse_usage_watts(body).unwrap();
    assert!((watts - 9000.0).abs() < 1e-6);
}

#[test]
fn malformed_usage_is_rejected() {
    assert!(parse_usage_watts(r#"{"devices": []}"#).is_err());
}

#[test]
fn password_login_returns_all_tokens() {
    let body = r#"{"AuthenticationResult":{"AccessToken":"a","ExpiresIn":3600,"IdToken":"i","RefreshToken":"r","TokenType":"Bearer"},"ChallengeParameters":{}}"#;
    let tokens = parse_auth_response(body).unwrap();
    assert_eq!(tokens.id_token, "i");
    assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
}
