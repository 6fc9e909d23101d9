// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end ride lifecycle scenarios against the in-memory store.

mod common;

use common::{drain, event_names, TestContext};

use ryde_core::error::CoreError;
use ryde_core::persistence::Persistence as _;
use ryde_core::{dispatch, rides, working_hours};
use ryde_protocol::events::{AcceptRide, BookRide, DriverCompletedRide};
use ryde_protocol::{Place, TransactionKind, TransactionMethod, VehicleType};

fn booking(user: &str, customer_id: &str, vehicle_type: VehicleType) -> BookRide {
    BookRide {
        user: user.to_string(),
        customer_id: Some(customer_id.to_string()),
        user_name: Some("Asha".to_string()),
        user_mobile: Some("9876543210".to_string()),
        pickup: Place {
            lat: 11.3459,
            lng: 77.7216,
            address: "Erode".to_string(),
        },
        drop: Place {
            lat: 11.3099,
            lng: 77.7387,
            address: "Bus stand".to_string(),
        },
        vehicle_type,
        distance: 5.4,
        travel_time: None,
        want_return: None,
        payment_method: None,
    }
}

fn accept(ride_id: &str, driver_id: &str) -> AcceptRide {
    AcceptRide {
        ride_id: ride_id.to_string(),
        driver_id: driver_id.to_string(),
        driver_name: None,
        driver_lat: Some(11.34),
        driver_lng: Some(77.72),
        vehicle_type: None,
    }
}

/// S1: the happy bike ride, from go-online to the bill.
#[tokio::test]
async fn happy_bike_ride_end_to_end() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRV001", VehicleType::Bike, 500).await;
    let user_id = ctx.seed_user("CUS0065", 0).await;

    let (_driver_session, mut driver_rx) = ctx.connect_driver("DRV001").await;
    working_hours::start(&ctx.state, "DRV001").await.unwrap();
    let driver = ctx.store.get_driver("DRV001").await.unwrap().unwrap();
    assert_eq!(driver.wallet, 400);

    let (_user_session, mut user_rx) = ctx.connect_user(user_id);

    // Book: server-side fare and customer-derived OTP.
    let outcome = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0065", VehicleType::Bike))
        .await
        .unwrap();
    assert_eq!(outcome.raid_id, "RID000001");
    assert_eq!(outcome.fare, 81);
    assert_eq!(outcome.otp, "0065");
    assert!(!outcome.already_sent);

    // The bike driver received the offer.
    let frames = drain(&mut driver_rx);
    assert!(event_names(&frames).contains(&"newRideRequest".to_string()));

    // Accept: passenger learns the winner.
    dispatch::handle_accept_ride(&ctx.state, None, accept("RID000001", "DRV001"))
        .await
        .unwrap();
    let frames = drain(&mut user_rx);
    assert!(event_names(&frames).contains(&"rideAccepted".to_string()));

    // Start requires the exact OTP.
    let err = rides::handle_start(&ctx.state, "RID000001", "DRV001", Some("9999"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOtp { .. }));
    rides::handle_start(&ctx.state, "RID000001", "DRV001", Some("0065"))
        .await
        .unwrap();
    drain(&mut user_rx);

    // Complete: fare recomputed from actual distance, driver credited.
    let completion = rides::handle_complete(
        &ctx.state,
        DriverCompletedRide {
            ride_id: "RID000001".to_string(),
            driver_id: "DRV001".to_string(),
            distance: 5.4,
            fare: Some(9999.0), // untrusted, ignored
            actual_pickup: None,
            actual_drop: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(completion.fare, 81);
    assert_eq!(completion.driver_balance, 481);

    // Contractual passenger emission order, rideCompleted without status.
    let frames = drain(&mut user_rx);
    let names = event_names(&frames);
    let bill = names.iter().position(|n| n == "billAlert").expect("billAlert");
    let completed = names
        .iter()
        .position(|n| n == "rideCompleted")
        .expect("rideCompleted");
    let status = names
        .iter()
        .position(|n| n == "rideStatusUpdate")
        .expect("rideStatusUpdate");
    assert!(bill < completed, "billAlert must precede rideCompleted");
    assert!(completed < status, "rideCompleted must precede rideStatusUpdate");
    assert_eq!(frames[bill]["data"]["fare"], 81);
    assert!(frames[completed]["data"].get("status").is_none());
    assert_eq!(frames[status]["data"]["status"], "completed");

    // Ledger: one shift fee, one ride fare, both with balanceAfter.
    let txns = ctx.store.transactions_snapshot();
    let methods: Vec<TransactionMethod> = txns.iter().map(|t| t.method).collect();
    assert_eq!(
        methods,
        vec![TransactionMethod::ShiftStartFee, TransactionMethod::RideFare]
    );
    assert_eq!(txns[1].amount, 81);
    assert_eq!(txns[1].kind, TransactionKind::Credit);
    assert_eq!(txns[1].balance_after, 481);

    // The driver is dispatchable again and the vehicle type never moved.
    let driver = ctx.store.get_driver("DRV001").await.unwrap().unwrap();
    assert_eq!(driver.status, ryde_protocol::DriverStatus::Live);
    assert_eq!(driver.vehicle_type, VehicleType::Bike);
}

/// S2: fan-out is strictly vehicle-type filtered.
#[tokio::test]
async fn dispatch_reaches_only_matching_vehicle_type() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRVB", VehicleType::Bike, 500).await;
    ctx.seed_driver("DRVT", VehicleType::Taxi, 500).await;
    ctx.seed_driver("DRVP", VehicleType::Port, 500).await;
    let user_id = ctx.seed_user("CUS0100", 0).await;

    let (_sb, mut rx_bike) = ctx.connect_driver("DRVB").await;
    let (_st, mut rx_taxi) = ctx.connect_driver("DRVT").await;
    let (_sp, mut rx_port) = ctx.connect_driver("DRVP").await;
    drain(&mut rx_bike);
    drain(&mut rx_taxi);
    drain(&mut rx_port);

    dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0100", VehicleType::Taxi))
        .await
        .unwrap();

    assert!(event_names(&drain(&mut rx_taxi)).contains(&"newRideRequest".to_string()));
    assert!(!event_names(&drain(&mut rx_bike)).contains(&"newRideRequest".to_string()));
    assert!(!event_names(&drain(&mut rx_port)).contains(&"newRideRequest".to_string()));

    // No driver's vehicle type changed.
    for (id, vt) in [
        ("DRVB", VehicleType::Bike),
        ("DRVT", VehicleType::Taxi),
        ("DRVP", VehicleType::Port),
    ] {
        assert_eq!(
            ctx.store.get_driver(id).await.unwrap().unwrap().vehicle_type,
            vt
        );
    }
}

/// S3: two drivers race; exactly one wins, the passenger hears one accept.
#[tokio::test]
async fn acceptance_race_has_single_winner() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRV001", VehicleType::Bike, 500).await;
    ctx.seed_driver("DRV002", VehicleType::Bike, 500).await;
    let user_id = ctx.seed_user("CUS0200", 0).await;
    let (_s1, _rx1) = ctx.connect_driver("DRV001").await;
    let (_s2, _rx2) = ctx.connect_driver("DRV002").await;
    let (_us, mut user_rx) = ctx.connect_user(user_id);

    let outcome = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0200", VehicleType::Bike))
        .await
        .unwrap();
    let ride_id = outcome.raid_id;

    let (a, b) = tokio::join!(
        dispatch::handle_accept_ride(&ctx.state, None, accept(&ride_id, "DRV001")),
        dispatch::handle_accept_ride(&ctx.state, None, accept(&ride_id, "DRV002")),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(winners, 1, "exactly one accept succeeds");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser.unwrap_err(), CoreError::RideTaken { .. }));

    let accepted_events = event_names(&drain(&mut user_rx))
        .into_iter()
        .filter(|n| n == "rideAccepted")
        .count();
    assert_eq!(accepted_events, 1, "passenger hears exactly one rideAccepted");
}

/// Idempotence: an identical submission within the window answers with the
/// same ride and suppresses the second fan-out.
#[tokio::test]
async fn duplicate_booking_within_window_is_suppressed() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRV001", VehicleType::Bike, 500).await;
    let user_id = ctx.seed_user("CUS0300", 0).await;
    let (_s, mut driver_rx) = ctx.connect_driver("DRV001").await;
    drain(&mut driver_rx);

    let first = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0300", VehicleType::Bike))
        .await
        .unwrap();
    let second = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0300", VehicleType::Bike))
        .await
        .unwrap();

    assert_eq!(first.raid_id, second.raid_id);
    assert!(!first.already_sent);
    assert!(second.already_sent);

    let offers = event_names(&drain(&mut driver_rx))
        .into_iter()
        .filter(|n| n == "newRideRequest")
        .count();
    assert_eq!(offers, 1, "one fan-out for the retried submission");
}

/// Rejection leaves the ride dispatchable and informs the passenger.
#[tokio::test]
async fn rejection_keeps_ride_pending() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRV001", VehicleType::Bike, 500).await;
    ctx.seed_driver("DRV002", VehicleType::Bike, 500).await;
    let user_id = ctx.seed_user("CUS0400", 0).await;
    let (_s1, _rx1) = ctx.connect_driver("DRV001").await;
    let (_us, mut user_rx) = ctx.connect_user(user_id);

    let outcome = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0400", VehicleType::Bike))
        .await
        .unwrap();

    dispatch::handle_reject_ride(
        &ctx.state,
        &outcome.raid_id,
        "DRV001",
        Some("too far".to_string()),
    )
    .await
    .unwrap();

    let ride = ctx.store.get_ride(&outcome.raid_id).await.unwrap().unwrap();
    assert_eq!(ride.status, ryde_protocol::RideStatus::Pending);
    assert_eq!(ride.rejected_by.len(), 1);
    assert_eq!(ride.rejected_by[0].driver_id, "DRV001");

    assert!(event_names(&drain(&mut user_rx)).contains(&"driverRejectedRide".to_string()));

    // A second driver can still take it.
    dispatch::handle_accept_ride(&ctx.state, None, accept(&outcome.raid_id, "DRV002"))
        .await
        .unwrap();
}

/// Completion is only reachable from `started`: a driver cannot skip the
/// OTP gate by completing straight from `accepted` or `arrived`.
#[tokio::test]
async fn completion_requires_a_started_ride() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRV001", VehicleType::Bike, 500).await;
    let user_id = ctx.seed_user("CUS0600", 0).await;
    let (_s, _rx) = ctx.connect_driver("DRV001").await;

    let outcome = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0600", VehicleType::Bike))
        .await
        .unwrap();
    dispatch::handle_accept_ride(&ctx.state, None, accept(&outcome.raid_id, "DRV001"))
        .await
        .unwrap();

    let complete = DriverCompletedRide {
        ride_id: outcome.raid_id.clone(),
        driver_id: "DRV001".to_string(),
        distance: 5.4,
        fare: None,
        actual_pickup: None,
        actual_drop: None,
    };

    // From accepted: refused, no credit.
    let err = rides::handle_complete(&ctx.state, complete.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    // From arrived: still refused.
    rides::handle_arrived(&ctx.state, &outcome.raid_id, "DRV001")
        .await
        .unwrap();
    let err = rides::handle_complete(&ctx.state, complete.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    let fares = ctx
        .store
        .transactions_snapshot()
        .iter()
        .filter(|t| t.method == TransactionMethod::RideFare)
        .count();
    assert_eq!(fares, 0);

    // The gate passed, completion goes through.
    rides::handle_start(&ctx.state, &outcome.raid_id, "DRV001", Some(&outcome.otp))
        .await
        .unwrap();
    rides::handle_complete(&ctx.state, complete).await.unwrap();
}

/// Completion is idempotent: a client retry answers with the committed
/// outcome and does not double-credit.
#[tokio::test]
async fn repeated_completion_does_not_double_credit() {
    let ctx = TestContext::new();
    ctx.seed_driver("DRV001", VehicleType::Bike, 500).await;
    let user_id = ctx.seed_user("CUS0500", 0).await;
    let (_s, _rx) = ctx.connect_driver("DRV001").await;

    let outcome = dispatch::handle_book_ride(&ctx.state, booking(&user_id.to_string(), "CUS0500", VehicleType::Bike))
        .await
        .unwrap();
    dispatch::handle_accept_ride(&ctx.state, None, accept(&outcome.raid_id, "DRV001"))
        .await
        .unwrap();
    rides::handle_start(&ctx.state, &outcome.raid_id, "DRV001", Some(&outcome.otp))
        .await
        .unwrap();

    let complete = |dist: f64| {
        rides::handle_complete(
            &ctx.state,
            DriverCompletedRide {
                ride_id: outcome.raid_id.clone(),
                driver_id: "DRV001".to_string(),
                distance: dist,
                fare: None,
                actual_pickup: None,
                actual_drop: None,
            },
        )
    };
    let first = complete(5.4).await.unwrap();
    let second = complete(5.4).await.unwrap();
    assert_eq!(first.fare, second.fare);
    assert_eq!(first.driver_balance, second.driver_balance);

    let fares = ctx
        .store
        .transactions_snapshot()
        .iter()
        .filter(|t| t.method == TransactionMethod::RideFare)
        .count();
    assert_eq!(fares, 1);
}
