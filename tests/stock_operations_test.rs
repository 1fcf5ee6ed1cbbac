mod common;

use assert_matches::assert_matches;
use common::*;
use rust_decimal_macros::dec;
use salon_inventory::{
    entities::{MovementType, MAX_MONEY},
    errors::ServiceError,
    events::Event,
    services::{AdjustmentType, NewProduct, ProductUpdate},
    store::{FaultPoint, MovementFilter},
};
use uuid::Uuid;

#[tokio::test]
async fn sale_decrements_stock_and_appends_one_out_entry() {
    let inv = Inventory::new();
    let item = inv.product(10, 2).await;
    let seller = Uuid::new_v4();

    let recorded = inv
        .services
        .sales
        .record_sale(sale(item.id, 4, seller))
        .await
        .expect("sale recorded");

    assert_eq!(recorded.quantity, 4);
    assert_eq!(recorded.unit_price, dec!(12.50));
    assert_eq!(recorded.total_price, price_times(4));
    assert_eq!(recorded.seller_id, seller);
    assert_eq!(inv.current(item.id).await.stock, 6);

    let entries = inv
        .services
        .ledger
        .recent(MovementFilter::for_product(item.id), 10)
        .await
        .unwrap();
    // newest first: the sale, then the initial stock entry
    assert_eq!(entries.len(), 2);
    let out = &entries[0];
    assert_eq!(out.movement_type, MovementType::Out);
    assert_eq!(out.quantity, 4);
    assert_eq!(out.reason, "sale");
    assert_eq!(out.user_id, Some(seller));
    assert_eq!((out.previous_stock, out.new_stock), (10, 6));
}

#[tokio::test]
async fn sale_without_stock_is_rejected_and_leaves_no_trace() {
    let inv = Inventory::new();
    let item = inv.product(0, 0).await;

    let err = inv
        .services
        .sales
        .record_sale(sale(item.id, 1, Uuid::new_v4()))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 1, available: 0, .. }
    );
    assert_eq!(inv.current(item.id).await.stock, 0);
    assert_eq!(inv.store.sale_count(), 0);
    assert_eq!(inv.store.movement_count(), 0);
}

#[tokio::test]
async fn return_restocks_and_records_reason() {
    let inv = Inventory::new();
    let item = inv.product(6, 0).await;
    let clerk = Uuid::new_v4();

    let record = inv
        .services
        .returns
        .record_return(customer_return(item.id, 2, "defective", clerk))
        .await
        .expect("return recorded");

    assert_eq!(record.quantity, 2);
    assert_eq!(record.reason, "defective");
    assert_eq!(inv.current(item.id).await.stock, 8);
    assert_eq!(inv.store.return_count(), 1);

    let latest = inv
        .services
        .ledger
        .recent(MovementFilter::for_product(item.id), 1)
        .await
        .unwrap();
    assert_eq!(latest[0].movement_type, MovementType::Return);
    assert_eq!(latest[0].quantity, 2);
    assert_eq!(latest[0].reason, "return: defective");
}

#[tokio::test]
async fn returns_are_not_capped_by_prior_sales() {
    let inv = Inventory::new();
    let item = inv.product(1, 0).await;

    inv.services
        .returns
        .record_return(customer_return(item.id, 50, "bulk return", Uuid::new_v4()))
        .await
        .expect("return recorded");

    assert_eq!(inv.current(item.id).await.stock, 51);
}

#[tokio::test]
async fn outbound_adjustment_beyond_stock_is_rejected() {
    let inv = Inventory::new();
    let item = inv.product(8, 0).await;
    let before = inv.store.movement_count();

    let err = inv
        .services
        .adjustments
        .record_adjustment(adjustment(item.id, AdjustmentType::Out, 20, "damage", Uuid::new_v4()))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock { requested: 20, available: 8, .. }
    );
    assert_eq!(inv.current(item.id).await.stock, 8);
    assert_eq!(inv.store.movement_count(), before);
}

#[tokio::test]
async fn adjustments_move_stock_both_ways() {
    let inv = Inventory::new();
    let item = inv.product(8, 0).await;
    let admin = Uuid::new_v4();

    let inbound = inv
        .services
        .adjustments
        .record_adjustment(adjustment(item.id, AdjustmentType::In, 12, "delivery", admin))
        .await
        .unwrap();
    assert_eq!(inbound.movement_type, MovementType::In);
    assert_eq!((inbound.previous_stock, inbound.new_stock), (8, 20));

    let outbound = inv
        .services
        .adjustments
        .record_adjustment(adjustment(item.id, AdjustmentType::Out, 5, "damage", admin))
        .await
        .unwrap();
    assert_eq!(outbound.reason, "damage");
    assert_eq!(outbound.user_id, Some(admin));
    assert_eq!(inv.current(item.id).await.stock, 15);
}

#[tokio::test]
async fn editing_stock_synthesizes_a_manual_edit_entry() {
    let inv = Inventory::new();
    let item = inv.product(10, 0).await;
    let before = inv.store.movement_count();

    let updated = inv
        .services
        .catalog
        .update(
            item.id,
            ProductUpdate {
                stock: Some(15),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(updated.stock, 15);
    assert_eq!(inv.store.movement_count(), before + 1);
    let latest = inv
        .services
        .ledger
        .recent(MovementFilter::for_product(item.id), 1)
        .await
        .unwrap();
    assert_eq!(latest[0].movement_type, MovementType::In);
    assert_eq!(latest[0].quantity, 5);
    assert_eq!(latest[0].reason, "manual edit");
}

#[tokio::test]
async fn editing_stock_down_records_an_out_entry() {
    let inv = Inventory::new();
    let item = inv.product(10, 0).await;

    inv.services
        .catalog
        .update(
            item.id,
            ProductUpdate {
                stock: Some(3),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let latest = inv
        .services
        .ledger
        .recent(MovementFilter::for_product(item.id), 1)
        .await
        .unwrap();
    assert_eq!(latest[0].movement_type, MovementType::Out);
    assert_eq!(latest[0].quantity, 7);
    assert_eq!(inv.services.ledger.replay_stock(item.id).await.unwrap(), 3);
}

#[tokio::test]
async fn editing_other_fields_appends_nothing() {
    let inv = Inventory::new();
    let item = inv.product(10, 0).await;
    let before = inv.store.movement_count();

    let updated = inv
        .services
        .catalog
        .update(
            item.id,
            ProductUpdate {
                sell_price: Some(dec!(14.00)),
                stock: Some(10),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(updated.sell_price, dec!(14.00));
    assert_eq!(updated.version, item.version + 1);
    assert_eq!(inv.store.movement_count(), before);
}

#[tokio::test]
async fn identical_sales_are_both_recorded() {
    let inv = Inventory::new();
    let item = inv.product(10, 0).await;
    let seller = Uuid::new_v4();

    let first = inv.services.sales.record_sale(sale(item.id, 2, seller)).await.unwrap();
    let second = inv.services.sales.record_sale(sale(item.id, 2, seller)).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(inv.store.sale_count(), 2);
    assert_eq!(inv.current(item.id).await.stock, 6);
}

#[tokio::test]
async fn expired_product_cannot_be_sold() {
    let inv = Inventory::new();
    let item = inv.product_expiring(10, 0, Some(yesterday())).await;

    let err = inv
        .services
        .sales
        .record_sale(sale(item.id, 1, Uuid::new_v4()))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ExpiredProduct(id) if id == item.id);
    assert_eq!(inv.current(item.id).await.stock, 10);
}

#[tokio::test]
async fn product_expiring_today_counts_as_expired() {
    let inv = Inventory::new();
    let today = chrono::Utc::now().date_naive();
    let item = inv.product_expiring(10, 0, Some(today)).await;

    let err = inv
        .services
        .sales
        .record_sale(sale(item.id, 1, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExpiredProduct(_));
}

#[tokio::test]
async fn expired_stock_can_still_be_returned_or_written_off() {
    let inv = Inventory::new();
    let item = inv.product_expiring(4, 0, Some(yesterday())).await;
    let admin = Uuid::new_v4();

    inv.services
        .adjustments
        .record_adjustment(adjustment(item.id, AdjustmentType::Out, 4, "expired", admin))
        .await
        .unwrap();
    inv.services
        .returns
        .record_return(customer_return(item.id, 1, "unopened", admin))
        .await
        .unwrap();

    assert_eq!(inv.current(item.id).await.stock, 1);
}

#[tokio::test]
async fn unknown_product_is_not_found_for_every_recorder() {
    let inv = Inventory::new();
    let missing = Uuid::new_v4();
    let user = Uuid::new_v4();

    assert_matches!(
        inv.services.sales.record_sale(sale(missing, 1, user)).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        inv.services
            .returns
            .record_return(customer_return(missing, 1, "defective", user))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        inv.services
            .adjustments
            .record_adjustment(adjustment(missing, AdjustmentType::In, 1, "count", user))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        inv.services
            .catalog
            .update(missing, ProductUpdate::default(), None)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn invalid_commands_are_rejected_before_touching_stock() {
    let inv = Inventory::new();
    let item = inv.product(5, 0).await;
    let user = Uuid::new_v4();

    assert_matches!(
        inv.services.sales.record_sale(sale(item.id, 0, user)).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        inv.services
            .returns
            .record_return(customer_return(item.id, 1, "", user))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        inv.services
            .adjustments
            .record_adjustment(adjustment(item.id, AdjustmentType::In, -3, "count", user))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_eq!(inv.current(item.id).await.stock, 5);
}

#[tokio::test]
async fn later_price_changes_do_not_touch_recorded_sales() {
    let inv = Inventory::new();
    let item = inv.product(5, 0).await;
    let seller = Uuid::new_v4();

    let recorded = inv.services.sales.record_sale(sale(item.id, 2, seller)).await.unwrap();
    inv.services
        .catalog
        .update(
            item.id,
            ProductUpdate {
                sell_price: Some(dec!(99.00)),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let detail = inv.services.catalog.get_detail(item.id).await.unwrap();
    assert_eq!(detail.recent_sales[0].id, recorded.id);
    assert_eq!(detail.recent_sales[0].unit_price, dec!(12.50));
    assert_eq!(detail.recent_sales[0].total_price, dec!(25.00));
}

#[tokio::test]
async fn oversized_prices_are_rejected_at_creation() {
    let inv = Inventory::new();
    let product = NewProduct {
        sell_price: dec!(70000000000000000000000000000),
        ..new_product("Caviar Cream", 10, 0, None)
    };

    let err = inv.services.catalog.create(product, None).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert!(inv.services.catalog.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn sale_total_beyond_the_money_column_is_rejected_without_writes() {
    let inv = Inventory::new();
    let item = inv
        .services
        .catalog
        .create(
            NewProduct {
                sell_price: MAX_MONEY,
                ..new_product("Gold Leaf Serum", 2000, 0, None)
            },
            None,
        )
        .await
        .expect("max price fits the column");
    let movements = inv.store.movement_count();

    let err = inv
        .services
        .sales
        .record_sale(sale(item.id, 2000, Uuid::new_v4()))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(inv.current(item.id).await.stock, 2000);
    assert_eq!(inv.store.sale_count(), 0);
    assert_eq!(inv.store.movement_count(), movements);

    let single = inv
        .services
        .sales
        .record_sale(sale(item.id, 1, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(single.total_price, MAX_MONEY);
}

#[tokio::test]
async fn archived_product_keeps_history_but_rejects_stock_operations() {
    let inv = Inventory::new();
    let item = inv.product(5, 0).await;
    let seller = Uuid::new_v4();
    inv.services.sales.record_sale(sale(item.id, 1, seller)).await.unwrap();

    inv.services.catalog.delete(item.id).await.unwrap();

    assert_matches!(inv.services.catalog.get(item.id).await, Err(ServiceError::NotFound(_)));
    assert!(inv.services.catalog.list().await.unwrap().is_empty());
    assert_matches!(
        inv.services.sales.record_sale(sale(item.id, 1, seller)).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(inv.services.catalog.delete(item.id).await, Err(ServiceError::NotFound(_)));

    assert!(inv.current(item.id).await.deleted_at.is_some());
    assert_eq!(inv.store.sale_count(), 1);
    assert_eq!(inv.services.ledger.replay_stock(item.id).await.unwrap(), 4);
}

#[tokio::test]
async fn fault_before_ledger_append_rolls_back_the_sale() {
    let inv = Inventory::new();
    let item = inv.product(10, 0).await;
    let movements = inv.store.movement_count();

    inv.store.fail_next(FaultPoint::AppendMovement);
    let err = inv
        .services
        .sales
        .record_sale(sale(item.id, 3, Uuid::new_v4()))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::DatabaseError(_));
    assert_eq!(inv.current(item.id).await.stock, 10);
    assert_eq!(inv.current(item.id).await.version, item.version);
    assert_eq!(inv.store.sale_count(), 0);
    assert_eq!(inv.store.movement_count(), movements);

    // nothing is left half-applied for the next caller
    inv.services
        .sales
        .record_sale(sale(item.id, 3, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(inv.current(item.id).await.stock, 7);
}

#[tokio::test]
async fn fault_inside_a_return_rolls_everything_back() {
    let inv = Inventory::new();
    let item = inv.product(6, 0).await;

    inv.store.fail_next(FaultPoint::SaveProduct);
    let err = inv
        .services
        .returns
        .record_return(customer_return(item.id, 2, "defective", Uuid::new_v4()))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::DatabaseError(_));
    assert_eq!(inv.current(item.id).await.stock, 6);
    assert_eq!(inv.store.return_count(), 0);
}

#[tokio::test]
async fn failed_commit_leaves_no_adjustment() {
    let inv = Inventory::new();
    let item = inv.product(6, 0).await;
    let movements = inv.store.movement_count();

    inv.store.fail_next(FaultPoint::Commit);
    let result = inv
        .services
        .adjustments
        .record_adjustment(adjustment(item.id, AdjustmentType::In, 4, "count", Uuid::new_v4()))
        .await;

    assert_matches!(result, Err(ServiceError::DatabaseError(_)));
    assert_eq!(inv.current(item.id).await.stock, 6);
    assert_eq!(inv.store.movement_count(), movements);
}

#[tokio::test]
async fn events_follow_committed_operations_only() {
    let mut inv = Inventory::new();
    let item = inv.product(5, 2).await;
    inv.drain_events();

    let recorded = inv
        .services
        .sales
        .record_sale(sale(item.id, 3, Uuid::new_v4()))
        .await
        .unwrap();
    let events = inv.drain_events();
    assert_eq!(
        events,
        vec![
            Event::SaleRecorded {
                sale_id: recorded.id,
                product_id: item.id,
                quantity: 3,
                total_price: price_times(3),
            },
            Event::LowStock {
                product_id: item.id,
                stock: 2,
                min_stock: 2,
            },
        ]
    );

    inv.store.fail_next(FaultPoint::InsertSale);
    let _ = inv.services.sales.record_sale(sale(item.id, 1, Uuid::new_v4())).await;
    assert!(inv.drain_events().is_empty());
}

#[tokio::test]
async fn ledger_replay_matches_stock_after_mixed_operations() {
    let inv = Inventory::new();
    let item = inv.product(10, 0).await;
    let user = Uuid::new_v4();

    inv.services.sales.record_sale(sale(item.id, 4, user)).await.unwrap();
    inv.services
        .returns
        .record_return(customer_return(item.id, 2, "defective", user))
        .await
        .unwrap();
    inv.services
        .adjustments
        .record_adjustment(adjustment(item.id, AdjustmentType::Out, 3, "damage", user))
        .await
        .unwrap();
    let _ = inv.services.sales.record_sale(sale(item.id, 50, user)).await;

    let stock = inv.current(item.id).await.stock;
    assert_eq!(stock, 5);
    assert_eq!(inv.services.ledger.replay_stock(item.id).await.unwrap(), i64::from(stock));
}
