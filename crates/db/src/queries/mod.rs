pub mod api_keys;
pub mod campaigns;
pub mod contacts;
pub mod delivery_logs;
pub mod payment_methods;
pub mod payment_sessions;
pub mod tenants;
pub mod transactions;
