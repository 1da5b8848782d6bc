// Core domain models
pub mod cart;
pub mod checkout;
pub mod order;

pub use cart::{Cart, CartLine, LineExtras, ModifierOption, ModifierSelection, Product};
pub use checkout::{
    BankField, BankInstructions, CheckoutData, CheckoutErrorCode, CheckoutPrefill, CheckoutStep,
    CustomerInfo, DeliveryAddress, DeliveryInfo, DeliveryMethod, PaymentMethod,
};
pub use order::{
    Order, OrderAddress, OrderCustomer, OrderDraft, OrderItem, OrderModifier, OrderModifierOption,
    OrderReceipt, OrderStatus, PaymentStatus, PendingOrder, SelectedVariation,
};
