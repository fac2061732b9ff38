// Order workflow
pub mod cart_service;
pub mod order_service;

// Fulfilment
pub mod delivery_service;

// Financial Services
pub mod payment_service;

// Reference data
pub mod directory_service;
