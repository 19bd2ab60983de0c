//! Postgres integration tests. Each test gets its own migrated database via
//! `#[sqlx::test]`.

use rust_decimal::Decimal;
use sqlx::PgPool;

use dropsync_db::{
    complete_sync_run, create_category, create_order, create_sync_run, fail_sync_run,
    get_default_category, insert_event_if_new, insert_mapping_if_absent, list_failed_events,
    list_low_confidence_mappings, list_order_lines, list_recategorizable_products,
    mark_event_failed, mark_field_edited, seed_reference_data, set_manual_mapping,
    set_mapping_created, start_sync_run, update_mapping_status, upsert_auto_mapping,
    upsert_supplier_product, upsert_variant, DbError, NewOrder, NewOrderItem, NewSupplierProduct,
    NewVariant,
};

fn sample_product(external_product_id: &str, category_id: Option<i64>) -> NewSupplierProduct {
    NewSupplierProduct {
        supplier_id: "cj".to_owned(),
        external_product_id: external_product_id.to_owned(),
        external_category: Some("Men > Wallets".to_owned()),
        name: "Leather Wallet".to_owned(),
        description: Some("Genuine leather".to_owned()),
        price: Some(Decimal::new(1250, 2)),
        images: vec!["https://img.example.com/1.jpg".to_owned()],
        category_id,
        needs_review: false,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn seed_is_idempotent_and_creates_default_category(pool: PgPool) {
    seed_reference_data(&pool).await.expect("first seed");
    seed_reference_data(&pool).await.expect("second seed");

    let default = get_default_category(&pool).await.expect("default category");
    assert!(default.is_default);
    assert_eq!(default.slug, "uncategorized");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logistics_options")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 5);
}

#[sqlx::test(migrations = "../../migrations")]
async fn auto_mapping_never_overwrites_manual(pool: PgPool) {
    let category_a = create_category(&pool, "Wallets", "wallets", false)
        .await
        .expect("category a");
    let category_b = create_category(&pool, "Belts", "belts", false)
        .await
        .expect("category b");

    let manual = set_manual_mapping(&pool, "cj", "Men > Wallets", category_a.id)
        .await
        .expect("manual mapping");
    assert!(manual.manually_mapped);
    assert_eq!(manual.confidence, Decimal::new(1000, 3));

    let after = upsert_auto_mapping(
        &pool,
        "cj",
        "Men > Wallets",
        category_b.id,
        Decimal::new(900, 3),
    )
    .await
    .expect("auto upsert against manual");

    assert_eq!(after.internal_category_id, category_a.id, "manual wins");
    assert!(after.manually_mapped);
    assert_eq!(after.confidence, Decimal::new(1000, 3));
}

#[sqlx::test(migrations = "../../migrations")]
async fn auto_mapping_updates_existing_auto_row(pool: PgPool) {
    let category_a = create_category(&pool, "Wallets", "wallets", false)
        .await
        .expect("category a");
    let category_b = create_category(&pool, "Belts", "belts", false)
        .await
        .expect("category b");

    let first = upsert_auto_mapping(&pool, "cj", "Men > Belts", category_a.id, Decimal::new(400, 3))
        .await
        .expect("first upsert");
    let second =
        upsert_auto_mapping(&pool, "cj", "Men > Belts", category_b.id, Decimal::new(850, 3))
            .await
            .expect("second upsert");

    assert_eq!(first.id, second.id, "same row updated in place");
    assert_eq!(second.internal_category_id, category_b.id);
    assert_eq!(second.confidence, Decimal::new(850, 3));
}

#[sqlx::test(migrations = "../../migrations")]
async fn low_confidence_queue_excludes_manual_mappings(pool: PgPool) {
    let category = create_category(&pool, "Wallets", "wallets", false)
        .await
        .expect("category");

    upsert_auto_mapping(&pool, "cj", "Odd > Path", category.id, Decimal::new(200, 3))
        .await
        .expect("low auto");
    upsert_auto_mapping(&pool, "cj", "Men > Wallets", category.id, Decimal::new(950, 3))
        .await
        .expect("high auto");
    set_manual_mapping(&pool, "cj", "Weird > Stuff", category.id)
        .await
        .expect("manual");

    let queue = list_low_confidence_mappings(&pool, Decimal::new(500, 3), 10)
        .await
        .expect("queue");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].external_category, "Odd > Path");
}

#[sqlx::test(migrations = "../../migrations")]
async fn resync_preserves_operator_edited_fields(pool: PgPool) {
    let (product, inserted) = upsert_supplier_product(&pool, &sample_product("P1", None))
        .await
        .expect("initial upsert");
    assert!(inserted);

    sqlx::query("UPDATE products SET name = 'Premium Wallet' WHERE id = $1")
        .bind(product.id)
        .execute(&pool)
        .await
        .expect("operator edit");
    mark_field_edited(&pool, product.id, "name")
        .await
        .expect("mark edited");

    let mut resynced = sample_product("P1", None);
    resynced.name = "Leather Wallet v2".to_owned();
    resynced.price = Some(Decimal::new(1399, 2));
    let (after, inserted) = upsert_supplier_product(&pool, &resynced)
        .await
        .expect("resync upsert");

    assert!(!inserted);
    assert_eq!(after.id, product.id);
    assert_eq!(after.name, "Premium Wallet", "edited name preserved");
    assert_eq!(after.price, Some(Decimal::new(1399, 2)), "price still syncs");
}

#[sqlx::test(migrations = "../../migrations")]
async fn edited_category_pins_assignment_and_review_flag(pool: PgPool) {
    let category = create_category(&pool, "Wallets", "wallets", false)
        .await
        .expect("category");
    let other = create_category(&pool, "Belts", "belts", false)
        .await
        .expect("other");

    let (product, _) = upsert_supplier_product(&pool, &sample_product("P1", Some(category.id)))
        .await
        .expect("initial upsert");
    mark_field_edited(&pool, product.id, "category")
        .await
        .expect("mark edited");

    let mut resynced = sample_product("P1", Some(other.id));
    resynced.needs_review = true;
    let (after, _) = upsert_supplier_product(&pool, &resynced)
        .await
        .expect("resync");

    assert_eq!(after.category_id, Some(category.id), "category pinned");
    assert!(!after.needs_review, "review flag pinned with category");

    let recategorizable = list_recategorizable_products(&pool, "cj")
        .await
        .expect("recategorizable");
    assert!(
        recategorizable.iter().all(|p| p.id != product.id),
        "pinned product excluded from automated re-mapping"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn variant_upsert_is_keyed_on_external_id(pool: PgPool) {
    let (product, _) = upsert_supplier_product(&pool, &sample_product("P1", None))
        .await
        .expect("product");

    let first = upsert_variant(
        &pool,
        product.id,
        &NewVariant {
            external_variant_id: "V1".to_owned(),
            sku: Some("WAL-BRN".to_owned()),
            price: Some(Decimal::new(1250, 2)),
            stock: 40,
        },
    )
    .await
    .expect("first");
    let second = upsert_variant(
        &pool,
        product.id,
        &NewVariant {
            external_variant_id: "V1".to_owned(),
            sku: Some("WAL-BRN".to_owned()),
            price: Some(Decimal::new(1199, 2)),
            stock: 12,
        },
    )
    .await
    .expect("second");

    assert_eq!(first.id, second.id);
    assert_eq!(second.stock, 12);
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_mapping_insert_is_idempotent(pool: PgPool) {
    let order = create_order(
        &pool,
        &NewOrder {
            user_ref: "user-1".to_owned(),
            ship_name: Some("Jane Doe".to_owned()),
            ship_street: Some("Musterstr. 1".to_owned()),
            ship_city: Some("Berlin".to_owned()),
            ship_zip: Some("10115".to_owned()),
            ship_country: Some("DE".to_owned()),
        },
        &[],
    )
    .await
    .expect("order");

    let (first, inserted_first) = insert_mapping_if_absent(&pool, order.id, "cj")
        .await
        .expect("first insert");
    let (second, inserted_second) = insert_mapping_if_absent(&pool, order.id, "cj")
        .await
        .expect("second insert");

    assert!(inserted_first);
    assert!(!inserted_second);
    assert_eq!(first.id, second.id);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM supplier_order_mappings WHERE order_id = $1")
            .bind(order.id)
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_updates_are_guarded_on_current_status(pool: PgPool) {
    let order = create_order(
        &pool,
        &NewOrder {
            user_ref: "user-1".to_owned(),
            ship_name: None,
            ship_street: None,
            ship_city: None,
            ship_zip: None,
            ship_country: None,
        },
        &[],
    )
    .await
    .expect("order");
    let (mapping, _) = insert_mapping_if_absent(&pool, order.id, "cj")
        .await
        .expect("mapping");

    let created = set_mapping_created(&pool, mapping.id, "SUP-900")
        .await
        .expect("created");
    assert_eq!(created.status, "created");

    let shipped = update_mapping_status(&pool, mapping.id, "created", "shipped", Some("TRK-1"))
        .await
        .expect("shipped");
    assert_eq!(shipped.status, "shipped");
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRK-1"));

    // A stale writer that still thinks the row is 'created' must lose.
    let stale = update_mapping_status(&pool, mapping.id, "created", "delivered", None).await;
    assert!(matches!(stale, Err(DbError::NotFound)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_lines_join_supplier_identities(pool: PgPool) {
    let (product, _) = upsert_supplier_product(&pool, &sample_product("P1", None))
        .await
        .expect("product");
    let variant = upsert_variant(
        &pool,
        product.id,
        &NewVariant {
            external_variant_id: "V1".to_owned(),
            sku: None,
            price: Some(Decimal::new(1250, 2)),
            stock: 5,
        },
    )
    .await
    .expect("variant");

    let order = create_order(
        &pool,
        &NewOrder {
            user_ref: "user-1".to_owned(),
            ship_name: None,
            ship_street: None,
            ship_city: None,
            ship_zip: None,
            ship_country: Some("DE".to_owned()),
        },
        &[NewOrderItem {
            product_id: product.id,
            variant_id: Some(variant.id),
            quantity: 2,
            unit_price: Decimal::new(1250, 2),
        }],
    )
    .await
    .expect("order");

    let lines = list_order_lines(&pool, order.id).await.expect("lines");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].supplier_id.as_deref(), Some("cj"));
    assert_eq!(lines[0].external_product_id.as_deref(), Some("P1"));
    assert_eq!(lines[0].external_variant_id.as_deref(), Some("V1"));
    assert_eq!(lines[0].quantity, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn webhook_duplicate_delivery_is_rejected(pool: PgPool) {
    let payload = serde_json::json!({"vid": "V1", "stock": 3});

    let first = insert_event_if_new(&pool, "cj", "STOCK", "msg-1", &payload)
        .await
        .expect("first");
    let second = insert_event_if_new(&pool, "cj", "STOCK", "msg-1", &payload)
        .await
        .expect("second");

    assert!(first.is_some());
    assert!(second.is_none(), "duplicate message_id must not insert");

    // Same message id from another supplier is a different delivery.
    let other = insert_event_if_new(&pool, "other", "STOCK", "msg-1", &payload)
        .await
        .expect("other supplier");
    assert!(other.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_webhook_events_are_listed_for_replay(pool: PgPool) {
    let payload = serde_json::json!({"orderId": "SUP-900"});
    let event = insert_event_if_new(&pool, "cj", "ORDER", "msg-2", &payload)
        .await
        .expect("insert")
        .expect("new event");

    mark_event_failed(&pool, event.id, "order mapping not found")
        .await
        .expect("mark failed");

    let failed = list_failed_events(&pool, 10).await.expect("failed list");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, event.id);
    assert_eq!(
        failed[0].error.as_deref(),
        Some("order mapping not found")
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_lifecycle_is_forward_only(pool: PgPool) {
    let run = create_sync_run(&pool, "cj", "manual").await.expect("run");
    assert_eq!(run.status, "queued");

    let running = start_sync_run(&pool, run.id).await.expect("start");
    assert_eq!(running.status, "running");
    assert!(running.started_at.is_some());

    // Starting twice is an invalid transition.
    let double_start = start_sync_run(&pool, run.id).await;
    assert!(matches!(
        double_start,
        Err(DbError::InvalidSyncRunTransition { expected_status: "queued", .. })
    ));

    let errors = serde_json::json!([{"pid": "P9", "error": "deserialize"}]);
    let done = complete_sync_run(&pool, run.id, 3, 2, 1, &errors)
        .await
        .expect("complete");
    assert_eq!(done.status, "succeeded");
    assert_eq!((done.added, done.updated, done.skipped), (3, 2, 1));

    // A finished run cannot be failed after the fact.
    let late_fail = fail_sync_run(&pool, run.id, "boom").await;
    assert!(matches!(
        late_fail,
        Err(DbError::InvalidSyncRunTransition { .. })
    ));
}
