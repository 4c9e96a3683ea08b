//! Basket MCP (Model Context Protocol) Server
//!
//! This crate exposes the vendor providers to AI agents over MCP: catalog
//! search, cart mutation, and interactive authorization, served over stdio.
//! One process serves exactly one vendor, selected by configuration at
//! startup.
//!
//! ## Architecture
//!
//! - `BasketMcpServer`: the tool surface, generic over any [`Provider`]
//! - `groceries://search/{item}`: search exposed as a resource template as
//!   well as a tool
//!
//! [`Provider`]: basket_vendors::Provider

mod server;

pub use server::BasketMcpServer;
