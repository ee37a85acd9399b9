//! Signature acceptance tests across all four gateways.
//!
//! Each test rebuilds the gateway's documented signature independently of the
//! adapter code, then checks that the adapter accepts the genuine signature
//! and rejects forgeries and tampered payloads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use printpay::gateways::adapters::signing::{hmac_sha256_hex, sha256_hex, sha512_hex};
use printpay::gateways::adapters::{
    CallbackContext, GatewayHttp, PaymentProvider, PayuProvider, PhonepeProvider,
    RazorpayProvider, StripeProvider,
};
use printpay::gateways::{GatewayCredentials, GatewayMode};
use serde_json::json;
use std::collections::HashMap;

fn creds(public: &str, secret: &str) -> GatewayCredentials {
    GatewayCredentials {
        public_key: public.to_string(),
        secret_key: secret.to_string(),
    }
}

fn http() -> GatewayHttp {
    GatewayHttp::new().unwrap()
}

// ---------------------------------------------------------------------------
// Razorpay: HMAC-SHA256
// ---------------------------------------------------------------------------

#[test]
fn test_razorpay_client_callback_signature() {
    let provider = RazorpayProvider::new(creds("rzp_test_key", "key_secret"), http());

    let signature = hmac_sha256_hex(b"key_secret", b"order_Nxq1rM|pay_Ab12Cd");
    let ctx = CallbackContext::from_payload(json!({
        "razorpay_order_id": "order_Nxq1rM",
        "razorpay_payment_id": "pay_Ab12Cd",
        "razorpay_signature": signature,
    }));
    assert!(provider.verify_signature(&ctx));

    // a different payment id must not verify against the same signature
    let forged = CallbackContext::from_payload(json!({
        "razorpay_order_id": "order_Nxq1rM",
        "razorpay_payment_id": "pay_Other",
        "razorpay_signature": signature,
    }));
    assert!(!provider.verify_signature(&forged));
}

#[test]
fn test_razorpay_webhook_uses_webhook_secret() {
    // "###" separates the API secret from the webhook signing secret
    let provider = RazorpayProvider::new(creds("rzp_test_key", "key_secret###whsec"), http());
    let raw = r#"{"event":"payment.captured","payload":{}}"#;

    let mut headers = HashMap::new();
    headers.insert(
        "X-Razorpay-Signature".to_string(),
        hmac_sha256_hex(b"whsec", raw.as_bytes()),
    );
    let ctx = CallbackContext::new(
        raw.to_string(),
        serde_json::from_str(raw).unwrap(),
        headers,
    );
    assert!(provider.verify_signature(&ctx));

    // signing with the API secret instead of the webhook secret must fail
    let mut wrong = HashMap::new();
    wrong.insert(
        "x-razorpay-signature".to_string(),
        hmac_sha256_hex(b"key_secret", raw.as_bytes()),
    );
    let ctx = CallbackContext::new(raw.to_string(), serde_json::from_str(raw).unwrap(), wrong);
    assert!(!provider.verify_signature(&ctx));
}

#[test]
fn test_razorpay_missing_signature_rejected() {
    let provider = RazorpayProvider::new(creds("rzp_test_key", "key_secret"), http());
    let ctx = CallbackContext::from_payload(json!({ "event": "payment.captured" }));
    assert!(!provider.verify_signature(&ctx));
}

// ---------------------------------------------------------------------------
// Stripe: timestamped HMAC header
// ---------------------------------------------------------------------------

#[test]
fn test_stripe_signature_header_accepted_within_tolerance() {
    let provider = StripeProvider::new(creds("pk_test", "sk_test###whsec_unit"), http());
    let raw = r#"{"type":"checkout.session.completed"}"#;

    let timestamp = Utc::now().timestamp();
    let v1 = hmac_sha256_hex(
        b"whsec_unit",
        format!("{timestamp}.{raw}").as_bytes(),
    );

    let mut headers = HashMap::new();
    headers.insert("Stripe-Signature".to_string(), format!("t={timestamp},v1={v1}"));
    let ctx = CallbackContext::new(raw.to_string(), serde_json::from_str(raw).unwrap(), headers);
    assert!(provider.verify_signature(&ctx));
}

#[test]
fn test_stripe_stale_timestamp_rejected() {
    let provider = StripeProvider::new(creds("pk_test", "sk_test###whsec_unit"), http());
    let raw = r#"{"type":"checkout.session.completed"}"#;

    // 10 minutes old, well past the replay window
    let timestamp = Utc::now().timestamp() - 600;
    let v1 = hmac_sha256_hex(
        b"whsec_unit",
        format!("{timestamp}.{raw}").as_bytes(),
    );

    let mut headers = HashMap::new();
    headers.insert("stripe-signature".to_string(), format!("t={timestamp},v1={v1}"));
    let ctx = CallbackContext::new(raw.to_string(), serde_json::from_str(raw).unwrap(), headers);
    assert!(!provider.verify_signature(&ctx));
}

#[test]
fn test_stripe_tampered_body_rejected() {
    let provider = StripeProvider::new(creds("pk_test", "sk_test###whsec_unit"), http());
    let raw = r#"{"type":"checkout.session.completed","amount":500}"#;
    let tampered = r#"{"type":"checkout.session.completed","amount":999}"#;

    let timestamp = Utc::now().timestamp();
    let v1 = hmac_sha256_hex(
        b"whsec_unit",
        format!("{timestamp}.{raw}").as_bytes(),
    );

    let mut headers = HashMap::new();
    headers.insert("stripe-signature".to_string(), format!("t={timestamp},v1={v1}"));
    let ctx = CallbackContext::new(
        tampered.to_string(),
        serde_json::from_str(tampered).unwrap(),
        headers,
    );
    assert!(!provider.verify_signature(&ctx));
}

// ---------------------------------------------------------------------------
// PhonePe: SHA256 x-verify with salt index suffix
// ---------------------------------------------------------------------------

#[test]
fn test_phonepe_x_verify_accepted() {
    let provider =
        PhonepeProvider::new(creds("MERCHANTUAT", "salt_value###3"), GatewayMode::Sandbox, http());

    let encoded = BASE64.encode(r#"{"code":"PAYMENT_SUCCESS"}"#);
    let x_verify = format!("{}###3", sha256_hex(format!("{encoded}salt_value").as_bytes()));

    let mut headers = HashMap::new();
    headers.insert("X-VERIFY".to_string(), x_verify);
    let ctx = CallbackContext::new(
        json!({ "response": encoded }).to_string(),
        json!({ "response": encoded }),
        headers,
    );
    assert!(provider.verify_signature(&ctx));
}

#[test]
fn test_phonepe_wrong_salt_rejected() {
    let provider =
        PhonepeProvider::new(creds("MERCHANTUAT", "salt_value###3"), GatewayMode::Sandbox, http());

    let encoded = BASE64.encode(r#"{"code":"PAYMENT_SUCCESS"}"#);
    let x_verify = format!("{}###3", sha256_hex(format!("{encoded}other_salt").as_bytes()));

    let mut headers = HashMap::new();
    headers.insert("x-verify".to_string(), x_verify);
    let ctx = CallbackContext::new(
        json!({ "response": encoded }).to_string(),
        json!({ "response": encoded }),
        headers,
    );
    assert!(!provider.verify_signature(&ctx));
}

#[test]
fn test_phonepe_default_salt_index_is_one() {
    // secret without "###" falls back to index 1
    let provider =
        PhonepeProvider::new(creds("MERCHANTUAT", "salt_value"), GatewayMode::Sandbox, http());

    let encoded = BASE64.encode(r#"{"code":"PAYMENT_SUCCESS"}"#);
    let x_verify = format!("{}###1", sha256_hex(format!("{encoded}salt_value").as_bytes()));

    let mut headers = HashMap::new();
    headers.insert("x-verify".to_string(), x_verify);
    let ctx = CallbackContext::new(
        json!({ "response": encoded }).to_string(),
        json!({ "response": encoded }),
        headers,
    );
    assert!(provider.verify_signature(&ctx));
}

// ---------------------------------------------------------------------------
// PayU: SHA512 reverse hash chain
// ---------------------------------------------------------------------------

fn payu_response_hash(salt: &str, key: &str, fields: &serde_json::Value) -> String {
    let f = |name: &str| fields.get(name).and_then(|v| v.as_str()).unwrap_or("");
    sha512_hex(
        format!(
            "{}|{}||||||{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            salt,
            f("status"),
            f("udf5"),
            f("udf4"),
            f("udf3"),
            f("udf2"),
            f("udf1"),
            f("email"),
            f("firstname"),
            f("productinfo"),
            f("amount"),
            f("txnid"),
            key,
        )
        .as_bytes(),
    )
}

#[test]
fn test_payu_response_hash_accepted() {
    let provider = PayuProvider::new(creds("payu_key", "payu_salt"), GatewayMode::Sandbox, http());

    let mut payload = json!({
        "status": "success",
        "txnid": "txn-900",
        "amount": "499.99",
        "productinfo": "Order ord-1",
        "firstname": "Asha",
        "email": "asha@example.com",
        "udf1": "ord-1",
        "mihpayid": "403993715531",
    });
    let hash = payu_response_hash("payu_salt", "payu_key", &payload);
    payload["hash"] = json!(hash);

    let ctx = CallbackContext::from_payload(payload);
    assert!(provider.verify_signature(&ctx));
}

#[test]
fn test_payu_uppercase_hash_accepted() {
    // PayU sometimes returns the digest uppercased
    let provider = PayuProvider::new(creds("payu_key", "payu_salt"), GatewayMode::Sandbox, http());

    let mut payload = json!({
        "status": "success",
        "txnid": "txn-901",
        "amount": "100.00",
        "productinfo": "Order ord-2",
        "firstname": "Asha",
        "email": "asha@example.com",
    });
    let hash = payu_response_hash("payu_salt", "payu_key", &payload).to_uppercase();
    payload["hash"] = json!(hash);

    let ctx = CallbackContext::from_payload(payload);
    assert!(provider.verify_signature(&ctx));
}

#[test]
fn test_payu_tampered_amount_rejected() {
    let provider = PayuProvider::new(creds("payu_key", "payu_salt"), GatewayMode::Sandbox, http());

    let mut payload = json!({
        "status": "success",
        "txnid": "txn-902",
        "amount": "499.99",
        "productinfo": "Order ord-3",
        "firstname": "Asha",
        "email": "asha@example.com",
    });
    let hash = payu_response_hash("payu_salt", "payu_key", &payload);
    payload["hash"] = json!(hash);
    payload["amount"] = json!("1.00");

    let ctx = CallbackContext::from_payload(payload);
    assert!(!provider.verify_signature(&ctx));
}

#[test]
fn test_payu_missing_hash_rejected() {
    let provider = PayuProvider::new(creds("payu_key", "payu_salt"), GatewayMode::Sandbox, http());
    let ctx = CallbackContext::from_payload(json!({ "status": "success", "txnid": "txn-903" }));
    assert!(!provider.verify_signature(&ctx));
}
