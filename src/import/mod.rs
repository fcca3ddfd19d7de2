pub mod carvault;
pub mod invoiceninja;
pub mod normalize;

use std::time::Duration;

/// Upper bound for one whole import invocation. Large backups copy thousands
/// of rows and attachment files; on expiry the transaction rolls back like
/// any other failure.
pub(crate) const IMPORT_TIMEOUT: Duration = Duration::from_secs(600);
