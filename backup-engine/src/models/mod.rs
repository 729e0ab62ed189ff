pub mod backup_job;
pub mod backup_record;
pub mod notification;
pub mod restore_record;
