pub use terra_core::*;

#[cfg(feature = "server")]
pub mod server {
    pub use terra_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use terra_client::*;
}

#[cfg(feature = "fs")]
pub mod fs {
    pub use terra_fs::*;
}

pub mod prelude {
    pub use terra_core::prelude::*;

    #[cfg(feature = "server")]
    pub use terra_server::prelude::*;

    #[cfg(feature = "client")]
    pub use terra_client::TerraClient;

    #[cfg(feature = "fs")]
    pub use terra_fs::FileSystemInstances;
}
