use serde::{Deserialize, Serialize};

/// Checkout steps, in forward order. `Widget` only exists on the way out of
/// `Payment` when the selected method renders an in-place card form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CheckoutStep {
    Customer,
    Delivery,
    Payment,
    Widget,
    Confirmation,
}

/// Payment methods selectable at the payment step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Whatsapp,
    GatewayRedirect,
    GatewayCard,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub method: DeliveryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<DeliveryAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
}

/// Data accumulated across checkout steps. Mutated additively; never reset
/// mid-flow except on a full restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

/// Customer + delivery data remembered between orders, offered back as
/// prefill when a new checkout starts for the same store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPrefill {
    pub customer: CustomerInfo,
    pub delivery: DeliveryInfo,
}

/// Symbolic error codes surfaced to the presentation layer, which maps them
/// to localized messages. Never free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CheckoutErrorCode {
    NameRequired,
    PhoneRequired,
    AddressRequired,
    CityRequired,
    StateRequired,
    GatewayNotConfigured,
    PaymentFailed,
    PaymentRejected,
}

/// Static bank details rendered on the transfer confirmation panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankInstructions {
    pub bank_name: String,
    pub account_holder: String,
    pub account_number: String,
}

/// Fields of the bank-instructions panel that support copy-to-clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankField {
    Bank,
    Holder,
    Account,
}
