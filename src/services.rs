pub mod allocation;
pub mod document_service;
pub mod finance_service;
pub mod inventory_service;
pub mod notification;
