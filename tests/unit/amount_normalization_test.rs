//! Property-based tests for gateway amount conversion.
//!
//! Every adapter converts ledger amounts (major units) to its native
//! denomination and back; money must survive the round trip exactly.

use printpay::core::Currency;
use printpay::gateways::adapters::{
    GatewayHttp, PaymentProvider, PayuProvider, PhonepeProvider, RazorpayProvider, StripeProvider,
};
use printpay::gateways::{GatewayCredentials, GatewayMode};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn credentials() -> GatewayCredentials {
    GatewayCredentials {
        public_key: "test_pub".to_string(),
        secret_key: "test_sec".to_string(),
    }
}

fn razorpay() -> RazorpayProvider {
    RazorpayProvider::new(credentials(), GatewayHttp::new().unwrap())
}

fn stripe() -> StripeProvider {
    StripeProvider::new(credentials(), GatewayHttp::new().unwrap())
}

fn phonepe() -> PhonepeProvider {
    PhonepeProvider::new(credentials(), GatewayMode::Sandbox, GatewayHttp::new().unwrap())
}

fn payu() -> PayuProvider {
    PayuProvider::new(credentials(), GatewayMode::Sandbox, GatewayHttp::new().unwrap())
}

proptest! {
    /// Property: INR paise conversion round-trips exactly for any 2-decimal
    /// amount (Razorpay and PhonePe both charge in paise).
    #[test]
    fn test_paise_round_trip(paise in 1i64..=10_000_000_000i64) {
        let amount = Decimal::new(paise, 2);

        for provider in [
            &razorpay() as &dyn PaymentProvider,
            &phonepe() as &dyn PaymentProvider,
        ] {
            let native = provider.normalize_amount(amount, Currency::INR);
            prop_assert_eq!(native, Decimal::from(paise));
            prop_assert_eq!(provider.denormalize_amount(native, Currency::INR), amount);
        }
    }

    /// Property: Stripe minor-unit conversion round-trips for two-decimal
    /// currencies.
    #[test]
    fn test_stripe_cents_round_trip(cents in 1i64..=10_000_000_000i64) {
        let amount = Decimal::new(cents, 2);
        let native = stripe().normalize_amount(amount, Currency::USD);

        prop_assert_eq!(native, Decimal::from(cents));
        prop_assert_eq!(stripe().denormalize_amount(native, Currency::USD), amount);
    }

    /// Property: zero-decimal currencies are passed to Stripe unscaled; a
    /// whole-yen amount is its own native value.
    #[test]
    fn test_stripe_zero_decimal_passthrough(yen in 1i64..=100_000_000i64) {
        let amount = Decimal::from(yen);
        let native = stripe().normalize_amount(amount, Currency::JPY);

        prop_assert_eq!(native, amount);
        prop_assert_eq!(stripe().denormalize_amount(native, Currency::JPY), amount);
    }

    /// Property: PayU posts major units; normalization only fixes the scale
    /// and never changes the value of an already-2-decimal amount.
    #[test]
    fn test_payu_major_units_identity(paise in 1i64..=10_000_000_000i64) {
        let amount = Decimal::new(paise, 2);
        let native = payu().normalize_amount(amount, Currency::INR);

        prop_assert_eq!(native, amount);
        prop_assert_eq!(payu().denormalize_amount(native, Currency::INR), amount);
    }
}

#[test]
fn test_paise_examples() {
    let provider = razorpay();
    assert_eq!(
        provider.normalize_amount(dec!(499.99), Currency::INR),
        dec!(49999)
    );
    assert_eq!(
        provider.normalize_amount(dec!(1), Currency::INR),
        dec!(100)
    );
    assert_eq!(
        provider.denormalize_amount(dec!(49999), Currency::INR),
        dec!(499.99)
    );
}

#[test]
fn test_stripe_yen_is_not_multiplied() {
    // 1000 JPY is 1000 to Stripe, not 100000
    assert_eq!(
        stripe().normalize_amount(dec!(1000), Currency::JPY),
        dec!(1000)
    );
    assert_eq!(
        stripe().normalize_amount(dec!(1000), Currency::USD),
        dec!(100000)
    );
}

#[test]
fn test_currency_scale_rejects_sub_unit_yen() {
    assert!(Currency::JPY.validate_amount(dec!(1000)).is_ok());
    assert!(Currency::JPY.validate_amount(dec!(1000.50)).is_err());
    assert!(Currency::INR.validate_amount(dec!(1000.50)).is_ok());
    assert!(Currency::INR.validate_amount(dec!(1000.505)).is_err());
}
