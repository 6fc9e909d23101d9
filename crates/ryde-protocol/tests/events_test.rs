// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire-shape tests for the closed event sets.

use ryde_protocol::events::{ClientEvent, PriceTable, RideStatusUpdate, WalletUpdate};
use ryde_protocol::{
    ClientFrame, RideStatus, ServerEvent, TransactionKind, TransactionMethod, VehicleType,
};

#[test]
fn every_inbound_event_name_decodes() {
    let frames = [
        r#"{"event":"registerUser","data":{"userId":"665f1c2e-9b1d-4a00-82ab-34cd56ef7890"}}"#,
        r#"{"event":"registerDriver","data":{"driverId":"DRV001","lat":11.3,"lng":77.7}}"#,
        r#"{"event":"driverGoOnline","data":{"driverId":"DRV001"}}"#,
        r#"{"event":"driverOffline","data":{"driverId":"DRV001"}}"#,
        r#"{"event":"driverLocationUpdate","data":{"driverId":"DRV001","lat":11.3,"lng":77.7}}"#,
        r#"{"event":"driverHeartbeat","data":{"driverId":"DRV001"}}"#,
        r#"{"event":"requestDriverLocations","data":{"lat":11.3,"lng":77.7,"radius":5.0}}"#,
        r#"{"event":"requestNearbyDrivers","data":{"vehicleType":"taxi"}}"#,
        r#"{"event":"getCurrentPrices"}"#,
        r#"{"event":"bookRide","data":{"user":"u1","pickup":{"lat":1.0,"lng":2.0},"drop":{"lat":3.0,"lng":4.0},"vehicleType":"bike","distance":5.4}}"#,
        r#"{"event":"acceptRide","data":{"rideId":"RID000001","driverId":"DRV001"}}"#,
        r#"{"event":"rejectRide","data":{"rideId":"RID000001","driverId":"DRV001","reason":"far"}}"#,
        r#"{"event":"otpVerified","data":{"rideId":"RID000001","driverId":"DRV001","otp":"0065"}}"#,
        r#"{"event":"driverStartedRide","data":{"rideId":"RID000001","driverId":"DRV001"}}"#,
        r#"{"event":"driverCompletedRide","data":{"rideId":"RID000001","driverId":"DRV001","distance":5.4}}"#,
        r#"{"event":"userLocationUpdate","data":{"userId":"u1","rideId":"RID000001","latitude":11.3,"longitude":77.7}}"#,
        r#"{"event":"updateFCMToken","data":{"driverId":"DRV001","fcmToken":"tok"}}"#,
        r#"{"event":"requestRideOTP","data":{"rideId":"RID000001"}}"#,
    ];
    for text in frames {
        let frame = ClientFrame::parse(text).expect(text);
        frame.decode().expect(text);
    }
}

#[test]
fn vehicle_type_case_is_normalized_on_decode() {
    let frame = ClientFrame::parse(
        r#"{"event":"bookRide","data":{"user":"u1","pickup":{"lat":1.0,"lng":2.0},"drop":{"lat":3.0,"lng":4.0},"vehicleType":"TAXI","distance":2.0}}"#,
    )
    .unwrap();
    match frame.decode().unwrap() {
        ClientEvent::BookRide(book) => assert_eq!(book.vehicle_type, VehicleType::Taxi),
        other => panic!("wrong variant: {:?}", other),
    }
}

#[test]
fn outbound_frames_carry_event_and_data() {
    let frame = ServerEvent::RideStatusUpdate(RideStatusUpdate {
        ride_id: "RID000001".to_string(),
        status: RideStatus::Accepted,
    })
    .to_frame();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["event"], "rideStatusUpdate");
    assert_eq!(value["data"]["rideId"], "RID000001");
    assert_eq!(value["data"]["status"], "accepted");
}

#[test]
fn wallet_update_uses_snake_case_method_names() {
    let frame = ServerEvent::WalletUpdate(WalletUpdate {
        balance: 400,
        amount: 100,
        kind: TransactionKind::Debit,
        method: TransactionMethod::ShiftStartFee,
    })
    .to_frame();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["data"]["method"], "shift_start_fee");
    assert_eq!(value["data"]["kind"], "debit");
}

#[test]
fn price_table_round_trips_through_json_object() {
    let mut prices = PriceTable::new();
    prices.insert(VehicleType::Bike, 15);
    prices.insert(VehicleType::Taxi, 40);
    let text = serde_json::to_string(&prices).unwrap();
    let back: PriceTable = serde_json::from_str(&text).unwrap();
    assert_eq!(back, prices);
}
