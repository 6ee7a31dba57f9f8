pub mod account_repo;
pub use account_repo::AccountRepository;
pub mod batch_repo;
pub use batch_repo::BatchRepository;
pub mod document_repo;
pub use document_repo::DocumentRepository;
pub mod medicine_repo;
pub use medicine_repo::MedicineRepository;
pub mod movement_repo;
pub use movement_repo::MovementRepository;
pub mod partner_repo;
pub use partner_repo::PartnerRepository;
pub mod sequence_repo;
pub use sequence_repo::SequenceRepository;
