// Realtime store: memory tree, REST client and change subscriptions
pub mod store;

// Smart-home domain model and store seeding
pub mod home;

// HTTP API and the local store emulator
pub mod api;

// Dashboard view models bound to live store data
pub mod dashboard;

// Configuration loading
pub mod config;

// Store credentials
pub mod credentials;
