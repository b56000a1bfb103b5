//! Checkout: price a cart, then place it
//!
//! `quote` only reads. `place` runs the same quote inside a transaction with
//! the customer row locked, writes the order, takes the coupon redemption and
//! the wallet debit, and asks the payment provider for an intent. Anything
//! failing before commit leaves no trace.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use mealdash_core::config::BusinessSection;
use mealdash_core::coupon::{self, CouponContext, CouponQuote};
use mealdash_core::pricing::{self, LineItem, PriceBreakdown, MAX_LINE_QUANTITY};
use mealdash_core::schedule::{cutoff_for, DeliveryDays};
use mealdash_core::servings::servings_for;
use mealdash_core::validation::in_range;
use mealdash_core::{
    Cents, CouponCode, Fulfillment, OrderKind, OrderStatus, SubOrderStatus, SubscriptionStatus, ValidationError,
    WalletEntryKind,
};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::repos::{coupons, customers, menu, orders, subscriptions, wallet, Customer, MealPlan, MenuItem};
use crate::http::ApiError;
use crate::integrations::{email, PaymentIntentRequest};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutItem {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub delivery_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: Uuid,
    #[serde(default)]
    pub fulfillment: Fulfillment,
    pub items: Vec<CheckoutItem>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub use_wallet: bool,
    /// Set when this cart fills a subscription's deliveries
    pub subscription_id: Option<Uuid>,
    /// Overrides the customer's saved address
    pub address: Option<String>,
}

/// A cart line as it will be written
#[derive(Debug, Clone, Serialize)]
pub struct PricedLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub delivery_date: NaiveDate,
    pub quantity: i32,
    pub unit_price: Cents,
    pub servings: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub customer_id: Uuid,
    pub kind: OrderKind,
    pub fulfillment: Fulfillment,
    pub subscription_id: Option<Uuid>,
    pub address: Option<String>,
    pub lines: Vec<PricedLine>,
    pub coupon: Option<CouponQuote>,
    pub price: PriceBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: Cents,
    pub payment_intent_id: Option<String>,
    /// Handed to the storefront to confirm the card payment
    pub client_secret: Option<String>,
}

fn rejected(code: &'static str, message: String) -> ApiError {
    ApiError::Rejected { code, message }
}

/// Who the order is for and under which terms.
struct Terms {
    kind: OrderKind,
    fulfillment: Fulfillment,
    address: Option<String>,
    plan: Option<MealPlan>,
    subscription_days: Option<DeliveryDays>,
}

async fn terms(conn: &mut PgConnection, customer: &Customer, req: &CheckoutRequest) -> Result<Terms, ApiError> {
    let requested_address = req.address.clone().filter(|a| !a.trim().is_empty());
    let Some(subscription_id) = req.subscription_id else {
        return Ok(Terms {
            kind: OrderKind::OneTime,
            fulfillment: req.fulfillment,
            address: requested_address.or_else(|| customer.address.clone()),
            plan: None,
            subscription_days: None,
        });
    };

    let sub = subscriptions::fetch(conn, subscription_id).await?;
    if sub.customer_id != customer.id {
        return Err(ApiError::Forbidden {
            reason: "subscription belongs to another customer".into(),
        });
    }
    if sub.status != SubscriptionStatus::Active {
        return Err(rejected("subscription_inactive", format!("subscription is {}", sub.status)));
    }
    let plan = menu::fetch_plan(conn, sub.plan_id).await?;
    Ok(Terms {
        kind: OrderKind::Subscription,
        fulfillment: sub.fulfillment,
        address: requested_address.or(sub.address).or_else(|| customer.address.clone()),
        plan: Some(plan),
        subscription_days: Some(sub.delivery_days),
    })
}

/// What every cart line is held to
struct LineRules<'a> {
    business_days: DeliveryDays,
    subscription_days: Option<DeliveryDays>,
    plan: Option<&'a MealPlan>,
    cutoff_hours: u32,
    tz: Tz,
    now: DateTime<Utc>,
}

/// Check one cart line and price it.
///
/// Checks run in order: quantity, item exists and is active, weekday offered
/// (by the business and the subscription), item available that weekday,
/// cutoff. The first failure is returned.
fn check_line(wanted: &CheckoutItem, item: Option<&MenuItem>, rules: &LineRules<'_>) -> Result<PricedLine, ApiError> {
    in_range("quantity", i64::from(wanted.quantity), 1, MAX_LINE_QUANTITY)?;
    let item = item.ok_or_else(|| ApiError::NotFound {
        resource: "menu item",
        id: wanted.menu_item_id.to_string(),
    })?;
    let date = wanted.delivery_date;
    let weekday = date.weekday();

    if !item.active {
        return Err(rejected("item_unavailable", format!("{} is no longer on the menu", item.name)));
    }
    if !rules.business_days.contains(weekday) || rules.subscription_days.is_some_and(|d| !d.contains(weekday)) {
        return Err(rejected("day_not_offered", format!("no deliveries on {}", weekday)));
    }
    if !item.available_days.contains(weekday) {
        return Err(rejected(
            "item_unavailable",
            format!("{} is not available on {}", item.name, weekday),
        ));
    }
    let cutoff = cutoff_for(date, rules.cutoff_hours, rules.tz);
    if rules.now >= cutoff {
        return Err(rejected("past_cutoff", format!("orders for {} closed at {}", date, cutoff)));
    }

    Ok(PricedLine {
        menu_item_id: item.id,
        name: item.name.clone(),
        delivery_date: date,
        quantity: wanted.quantity,
        unit_price: rules.plan.map_or(item.price, MealPlan::price_per_meal),
        servings: servings_for(wanted.quantity, item.servings_per_unit, rules.plan.map(|p| p.servings_per_meal)),
    })
}

/// A subscription cart carries exactly the plan's meal count on every date.
fn check_plan_meals(lines: &[PricedLine], plan: &MealPlan) -> Result<(), ApiError> {
    let mut per_date: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for line in lines {
        *per_date.entry(line.delivery_date).or_default() += i64::from(line.quantity);
    }
    match per_date
        .iter()
        .find(|(_, n)| **n != i64::from(plan.meals_per_delivery))
    {
        Some((date, n)) => Err(rejected(
            "plan_mismatch",
            format!(
                "{} has {} meals, the {} plan delivers {}",
                date, n, plan.name, plan.meals_per_delivery
            ),
        )),
        None => Ok(()),
    }
}

/// Price a cart against the current business rules. Reads only.
pub async fn quote(
    conn: &mut PgConnection,
    business: &BusinessSection,
    req: &CheckoutRequest,
    now: DateTime<Utc>,
) -> Result<Quote, ApiError> {
    if req.items.is_empty() {
        return Err(ValidationError::Empty { field: "items" }.into());
    }
    let tz = business.tz()?;
    let customer = customers::fetch(conn, req.customer_id).await?;
    let terms = terms(conn, &customer, req).await?;

    if terms.fulfillment == Fulfillment::Delivery && terms.address.is_none() {
        return Err(ValidationError::Empty { field: "address" }.into());
    }

    let ids: Vec<Uuid> = req.items.iter().map(|i| i.menu_item_id).collect();
    let items: HashMap<Uuid, MenuItem> = menu::fetch_items(conn, &ids)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let rules = LineRules {
        business_days: business.delivery_days,
        subscription_days: terms.subscription_days,
        plan: terms.plan.as_ref(),
        cutoff_hours: business.order_cutoff_hours,
        tz,
        now,
    };
    let lines = req
        .items
        .iter()
        .map(|wanted| check_line(wanted, items.get(&wanted.menu_item_id), &rules))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(plan) = &terms.plan {
        check_plan_meals(&lines, plan)?;
    }

    let line_items: Vec<LineItem> = lines
        .iter()
        .map(|l| LineItem {
            menu_item_id: l.menu_item_id,
            unit_price: l.unit_price,
            quantity: l.quantity,
            delivery_date: l.delivery_date,
        })
        .collect();
    let subtotal = pricing::subtotal(&line_items)?;

    let coupon = match req.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let code = CouponCode::new(raw)?;
            let found = coupons::fetch(conn, &code).await?;
            let used = coupons::count_customer_redemptions(conn, &code, customer.id).await?;
            let ctx = CouponContext {
                now,
                subtotal,
                order_kind: terms.kind,
                customer_redemptions: used,
            };
            Some(coupon::validate(&found, &ctx)?)
        }
        None => None,
    };

    let price = pricing::price(
        &line_items,
        terms.fulfillment,
        &business.pricing_rules(),
        coupon.as_ref().map_or(Cents::ZERO, |c| c.discount),
        customer.wallet_balance(),
        req.use_wallet,
    )?;

    Ok(Quote {
        customer_id: customer.id,
        kind: terms.kind,
        fulfillment: terms.fulfillment,
        subscription_id: req.subscription_id,
        address: terms.address,
        lines,
        coupon,
        price,
    })
}

/// Write the order and start payment.
pub async fn place(state: &AppState, req: &CheckoutRequest) -> Result<PlacedOrder, ApiError> {
    let business = state.business().await?;
    let mut tx = state.pool.begin().await?;

    // Lock the wallet before reading its balance
    let customer = customers::fetch_for_update(&mut tx, req.customer_id).await?;
    let quote = quote(&mut tx, &business, req, Utc::now()).await?;
    let price = quote.price;

    let order = orders::insert_order(
        &mut tx,
        &orders::NewOrder {
            customer_id: customer.id,
            subscription_id: quote.subscription_id,
            kind: quote.kind,
            fulfillment: quote.fulfillment,
            price,
            coupon_code: quote.coupon.as_ref().map(|c| c.code.clone()),
        },
    )
    .await?;

    let address = match quote.fulfillment {
        Fulfillment::Delivery => quote.address.as_deref(),
        Fulfillment::Pickup => None,
    };
    let mut by_date: BTreeMap<NaiveDate, Vec<&PricedLine>> = BTreeMap::new();
    for line in &quote.lines {
        by_date.entry(line.delivery_date).or_default().push(line);
    }
    let mut sub_order_ids = Vec::with_capacity(by_date.len());
    for (date, lines) in by_date {
        let sub = orders::insert_sub_order(&mut tx, order.id, date, address).await?;
        for line in lines {
            orders::insert_item(&mut tx, sub.id, line.menu_item_id, line.quantity, line.unit_price, line.servings)
                .await?;
        }
        sub_order_ids.push(sub.id);
    }

    if let Some(c) = &quote.coupon {
        coupons::redeem(&mut tx, &c.code, customer.id, order.id, c.discount).await?;
    }
    if price.wallet_applied > Cents::ZERO {
        wallet::record(
            &mut tx,
            customer.id,
            WalletEntryKind::Purchase,
            -price.wallet_applied,
            Some(order.id),
            Some("order payment"),
        )
        .await?;
    }

    if price.total.is_zero() {
        orders::set_sub_statuses(&mut tx, &sub_order_ids, SubOrderStatus::Paid).await?;
        orders::set_status(&mut tx, order.id, OrderStatus::Paid).await?;
        tx.commit().await?;
        tracing::info!(order_id = %order.id, "order placed, fully covered");
        send_confirmation(state, &business.name, &customer.email, order.id).await;
        return Ok(PlacedOrder {
            order_id: order.id,
            status: OrderStatus::Paid,
            total: price.total,
            payment_intent_id: None,
            client_secret: None,
        });
    }

    // Order rows stay uncommitted until the intent exists
    let intent = state
        .payments
        .create_payment_intent(&PaymentIntentRequest {
            order_id: order.id,
            customer_id: customer.id,
            customer_email: customer.email.clone(),
            amount: price.total,
        })
        .await?;
    orders::set_payment_intent(&mut tx, order.id, &intent.id).await?;
    tx.commit().await?;

    tracing::info!(order_id = %order.id, total = %price.total, intent = %intent.id, "order placed");
    Ok(PlacedOrder {
        order_id: order.id,
        status: OrderStatus::PendingPayment,
        total: price.total,
        payment_intent_id: Some(intent.id),
        client_secret: intent.client_secret,
    })
}

/// Email the order summary. Failures are logged, never returned.
pub async fn send_confirmation(state: &AppState, business_name: &str, to: &str, order_id: Uuid) {
    let detail = match orders::OrderRepo::new(&state.pool).detail(order_id).await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(order_id = %order_id, error = %e, "could not load order for confirmation email");
            return;
        }
    };
    let message = email::order_confirmation(business_name, to, &detail);
    if let Err(e) = state.mailer.send(&message).await {
        tracing::warn!(order_id = %order_id, error = %e, "confirmation email failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mealdash_core::coupon::{Coupon, CouponScope, DiscountKind};
    use mealdash_core::{Email, Slug};

    use crate::db::repos::{CouponRepo, CustomerRepo, MenuRepo, NewCustomer, NewMenuItem};
    use crate::http::routes::testing::{lazy_state, RecordingMailer};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn item(active: bool, days: &str) -> MenuItem {
        MenuItem {
            id: Uuid::from_u128(7),
            slug: "green-curry".into(),
            name: "Green Curry".into(),
            description: None,
            price: Cents(1_400),
            cost_per_serving: Cents(300),
            servings_per_unit: 2,
            batch_yield: 10,
            available_days: days.parse().unwrap(),
            active,
            created_at: Utc::now(),
        }
    }

    fn plan() -> MealPlan {
        MealPlan {
            id: Uuid::from_u128(9),
            slug: "family".into(),
            name: "Family".into(),
            meals_per_delivery: 3,
            servings_per_meal: 4,
            price_per_meal_cents: 1_100,
            active: true,
        }
    }

    fn wanted(quantity: i32, date: NaiveDate) -> CheckoutItem {
        CheckoutItem {
            menu_item_id: Uuid::from_u128(7),
            quantity,
            delivery_date: date,
        }
    }

    fn rules(plan: Option<&MealPlan>) -> LineRules<'_> {
        LineRules {
            business_days: "mon,wed,fri".parse().unwrap(),
            subscription_days: None,
            plan,
            cutoff_hours: 48,
            tz: chrono_tz::America::New_York,
            now: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn code(err: ApiError) -> &'static str {
        match err {
            ApiError::Rejected { code, .. } => code,
            ApiError::Validation(_) => "validation",
            ApiError::NotFound { .. } => "not_found",
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn prices_a_one_time_line() {
        let line = check_line(&wanted(2, monday()), Some(&item(true, "mon,wed")), &rules(None)).unwrap();
        assert_eq!(line.unit_price, Cents(1_400));
        assert_eq!(line.servings, 4);
        assert_eq!(line.name, "Green Curry");
    }

    #[test]
    fn plan_lines_use_plan_price_and_servings() {
        let p = plan();
        let line = check_line(&wanted(1, monday()), Some(&item(true, "mon")), &rules(Some(&p))).unwrap();
        assert_eq!(line.unit_price, Cents(1_100));
        assert_eq!(line.servings, 8);
    }

    #[test]
    fn quantity_is_checked_before_anything_else() {
        let r = rules(None);
        assert_eq!(code(check_line(&wanted(0, monday()), None, &r).unwrap_err()), "validation");
        assert_eq!(code(check_line(&wanted(51, monday()), None, &r).unwrap_err()), "validation");
        // Must not overflow while computing servings
        let huge = wanted(1_500_000_000, monday());
        assert_eq!(code(check_line(&huge, Some(&item(true, "mon")), &r).unwrap_err()), "validation");
    }

    #[test]
    fn line_rejections_in_order() {
        let r = rules(None);
        let tuesday = monday() + Duration::days(1);
        let wednesday = monday() + Duration::days(2);

        assert_eq!(code(check_line(&wanted(1, monday()), None, &r).unwrap_err()), "not_found");
        // Inactive wins over a day the business does not serve
        assert_eq!(
            code(check_line(&wanted(1, tuesday), Some(&item(false, "mon")), &r).unwrap_err()),
            "item_unavailable"
        );
        // Business day wins over item availability
        assert_eq!(
            code(check_line(&wanted(1, tuesday), Some(&item(true, "mon")), &r).unwrap_err()),
            "day_not_offered"
        );
        let err = check_line(&wanted(1, wednesday), Some(&item(true, "mon")), &r).unwrap_err();
        assert!(matches!(&err, ApiError::Rejected { message, .. } if message.contains("not available on Wed")));

        // Availability wins over the cutoff
        let late = LineRules {
            now: Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap(),
            ..rules(None)
        };
        assert_eq!(
            code(check_line(&wanted(1, wednesday), Some(&item(true, "mon")), &late).unwrap_err()),
            "item_unavailable"
        );
        assert_eq!(
            code(check_line(&wanted(1, monday()), Some(&item(true, "mon")), &late).unwrap_err()),
            "past_cutoff"
        );
    }

    #[test]
    fn subscription_days_limit_lines() {
        let r = LineRules {
            subscription_days: Some("wed".parse().unwrap()),
            ..rules(None)
        };
        assert_eq!(
            code(check_line(&wanted(1, monday()), Some(&item(true, "mon,wed")), &r).unwrap_err()),
            "day_not_offered"
        );
        assert!(check_line(&wanted(1, monday() + Duration::days(2)), Some(&item(true, "mon,wed")), &r).is_ok());
    }

    #[test]
    fn cutoff_boundary() {
        // Midnight of Mon 9 March in New York (EDT) is 04:00 UTC; 48h earlier closes it
        let just_before = LineRules {
            now: Utc.with_ymd_and_hms(2026, 3, 7, 3, 59, 59).unwrap(),
            ..rules(None)
        };
        assert!(check_line(&wanted(1, monday()), Some(&item(true, "mon")), &just_before).is_ok());
        let at = LineRules {
            now: Utc.with_ymd_and_hms(2026, 3, 7, 4, 0, 0).unwrap(),
            ..rules(None)
        };
        assert_eq!(
            code(check_line(&wanted(1, monday()), Some(&item(true, "mon")), &at).unwrap_err()),
            "past_cutoff"
        );
    }

    #[test]
    fn plan_meal_counts_per_date() {
        let p = plan();
        let r = rules(Some(&p));
        let i = item(true, "mon,wed");
        let wed = monday() + Duration::days(2);
        let line = |q, d| check_line(&wanted(q, d), Some(&i), &r).unwrap();

        assert!(check_plan_meals(&[line(2, monday()), line(1, monday()), line(3, wed)], &p).is_ok());
        let err = check_plan_meals(&[line(2, monday()), line(3, wed)], &p).unwrap_err();
        assert!(matches!(&err, ApiError::Rejected { code: "plan_mismatch", message } if message.contains("2026-03-09")));
    }

    // Run with: DATABASE_URL=postgres://... cargo test -p mealdash-server -- --ignored

    async fn pool() -> sqlx::PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.unwrap();
        crate::db::migrations::run(&pool).await.unwrap();
        pool
    }

    /// First date at least ten days out that the business delivers on.
    fn next_delivery_day(business: &BusinessSection) -> NaiveDate {
        (Utc::now() + Duration::days(10))
            .date_naive()
            .iter_days()
            .find(|d| business.delivery_days.contains(d.weekday()))
            .unwrap()
    }

    async fn seed(pool: &sqlx::PgPool, wallet_cents: i64) -> (Customer, MenuItem) {
        let tag = Uuid::new_v4().simple().to_string();
        let customer = CustomerRepo::new(pool)
            .upsert(&NewCustomer {
                email: Email::new(&format!("{}@example.com", tag)).unwrap(),
                name: "Checkout".into(),
                phone: None,
                address: Some("1 Main St".into()),
            })
            .await
            .unwrap();
        if wallet_cents > 0 {
            let mut conn = pool.acquire().await.unwrap();
            wallet::record(&mut conn, customer.id, WalletEntryKind::TopUp, Cents(wallet_cents), None, None)
                .await
                .unwrap();
        }
        let item = MenuRepo::new(pool)
            .create(&NewMenuItem {
                slug: Slug::new(&format!("dish-{}", &tag[..12])).unwrap(),
                name: "Dish".into(),
                description: None,
                price: Cents(1_200),
                cost_per_serving: Cents(300),
                servings_per_unit: 1,
                batch_yield: 1,
                available_days: DeliveryDays::ALL,
            })
            .await
            .unwrap();
        (customer, item)
    }

    fn cart(customer: &Customer, item: &MenuItem, date: NaiveDate) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: customer.id,
            fulfillment: Fulfillment::Pickup,
            items: vec![CheckoutItem {
                menu_item_id: item.id,
                quantity: 2,
                delivery_date: date,
            }],
            coupon_code: None,
            use_wallet: false,
            subscription_id: None,
            address: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn wallet_covered_order_is_paid_and_confirmed() {
        let mailer = std::sync::Arc::new(RecordingMailer::default());
        let state = AppState {
            pool: pool().await,
            mailer: mailer.clone(),
            ..lazy_state()
        };
        let business = state.business().await.unwrap();
        let (customer, item) = seed(&state.pool, 10_000).await;
        let req = CheckoutRequest {
            use_wallet: true,
            ..cart(&customer, &item, next_delivery_day(&business))
        };

        let placed = place(&state, &req).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Paid);
        assert!(placed.total.is_zero());
        assert!(placed.payment_intent_id.is_none());

        let after = CustomerRepo::new(&state.pool).get(customer.id).await.unwrap();
        assert_eq!(after.wallet_balance(), Cents(10_000 - 2_400));
        let mut conn = state.pool.acquire().await.unwrap();
        assert_eq!(wallet::held_for_order(&mut conn, placed.order_id).await.unwrap(), Cents(2_400));

        let detail = orders::OrderRepo::new(&state.pool).detail(placed.order_id).await.unwrap();
        assert!(detail.sub_orders.iter().all(|s| s.sub_order.status == SubOrderStatus::Paid));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn coupon_is_redeemed_and_payment_started() {
        let state = AppState {
            pool: pool().await,
            ..lazy_state()
        };
        let business = state.business().await.unwrap();
        let (customer, item) = seed(&state.pool, 0).await;
        let code = CouponCode::new(&format!("T{}", &Uuid::new_v4().simple().to_string()[..10])).unwrap();
        CouponRepo::new(&state.pool)
            .create(&Coupon {
                code: code.clone(),
                description: None,
                discount_kind: DiscountKind::Fixed,
                discount_value: 500,
                scope: CouponScope::Any,
                min_subtotal: None,
                max_redemptions: None,
                per_customer_limit: Some(1),
                redemptions: 0,
                starts_at: None,
                expires_at: None,
                active: true,
            })
            .await
            .unwrap();
        let req = CheckoutRequest {
            coupon_code: Some(code.as_str().to_owned()),
            ..cart(&customer, &item, next_delivery_day(&business))
        };

        let placed = place(&state, &req).await.unwrap();
        assert_eq!(placed.status, OrderStatus::PendingPayment);
        assert_eq!(placed.total, Cents(2_400 - 500));
        assert_eq!(
            placed.payment_intent_id.as_deref(),
            Some(format!("pi_{}", placed.order_id.simple()).as_str())
        );
        let used = CouponRepo::new(&state.pool)
            .customer_redemptions(&code, customer.id)
            .await
            .unwrap();
        assert_eq!(used, 1);

        // Second use breaks the per-customer limit and writes nothing
        let err = place(&state, &req).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { .. }));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn rejected_cart_writes_nothing() {
        let state = AppState {
            pool: pool().await,
            ..lazy_state()
        };
        let (customer, item) = seed(&state.pool, 1_000).await;
        let req = CheckoutRequest {
            use_wallet: true,
            ..cart(&customer, &item, Utc::now().date_naive())
        };

        let err = place(&state, &req).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { .. }));
        let after = CustomerRepo::new(&state.pool).get(customer.id).await.unwrap();
        assert_eq!(after.wallet_balance(), Cents(1_000));
    }
}
