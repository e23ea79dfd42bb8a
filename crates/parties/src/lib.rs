//! Parties of a financial document: the buyer (`Client`) and the seller
//! (`SellerProfile`).
//!
//! Pure value/entity types, no IO. The seller profile is always passed in
//! explicitly by the caller; nothing in this workspace looks it up globally.

pub mod client;
pub mod party;
pub mod seller;

pub use client::{BuyerType, Client, ClientId};
pub use party::{Address, ContactInfo, CountryCode};
pub use seller::{BankDetails, SellerProfile, VatRegime};
