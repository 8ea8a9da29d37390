mod datacenter_password;
mod datacenter_uri;
mod datacenter_username;
mod machine_name;

pub use datacenter_password::DatacenterPassword;
pub use datacenter_uri::{DATACENTER_URI_PREFIX, DatacenterUri};
pub use datacenter_username::DatacenterUsername;
pub use machine_name::MachineName;

