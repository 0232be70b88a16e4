//! Flowsheet Core Types
//!
//! This crate provides the foundational types shared by the flowsheet
//! resolution engine and its front ends:
//!
//! - **Identifiers**: String-interned names ([`identifier::Id`])
//! - **Elements**: The already-parsed fragment tree ([`element::Element`]) that
//!   serializer front ends hand to the engine, with typed tags ([`element::Tag`])
//! - **Flags**: Boolean attribute parsing and schema defaults ([`flag`] module)

pub mod element;
pub mod flag;
pub mod identifier;
