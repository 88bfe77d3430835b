pub(crate) mod data {
    pub(crate) mod datasources {
        pub(crate) mod backend_datasource;
        pub(crate) mod local_store_datasource;
        pub(crate) mod native_store_datasource;
        pub(crate) mod store_datasource;
    }
    pub(crate) mod models {
        pub(crate) mod gbapi {
            pub(crate) mod common;
            pub(crate) mod init_model;
            pub(crate) mod product_list_model;
            pub(crate) mod product_list_response_model;
            pub(crate) mod purchase_model;
            pub(crate) mod purchase_response_model;
        }
        pub(crate) mod local_store {
            pub(crate) mod ledger_model;
        }
        pub(crate) mod native_store {
            pub(crate) mod google_play_receipt_model;
            pub(crate) mod native_product_model;
            pub(crate) mod native_purchase_model;
        }
    }
    pub(crate) mod repositories {
        pub(crate) mod iap_repository_impl;
    }
}

pub mod domain {
    pub mod entities {
        pub mod iap_event;
        pub mod iap_session;
        pub mod product;
        pub mod purchase;
        pub mod purchase_failure_reason;
        pub mod purchase_state;
        pub mod store_transaction;
    }
    pub mod repositories {
        pub mod iap_repository;
        pub mod social_provider;
    }
    pub mod purchase_state_machine;
}

pub mod config;
pub mod errors;
pub mod event_bus;
pub mod util;

// Host-side glue for native billing SDKs.
pub use data::datasources::native_store_datasource::NativeStoreBridge;
pub use data::models::native_store::native_product_model::NativeProductModel;
pub use data::models::native_store::native_purchase_model::{
    FinalizationModel, NativePurchaseModel,
};

pub use config::{CatalogSource, IapConfig, RetryPolicy, StorePlatform};
pub use domain::entities::iap_event::{IapEvent, IapEventName, InitPayload};
pub use domain::entities::product::{CatalogResult, Product};
pub use domain::entities::purchase::PurchaseIntent;
pub use domain::entities::purchase_failure_reason::PurchaseFailureReason;
pub use domain::entities::store_transaction::StoreTransaction;
pub use event_bus::EventBus;
pub use util::IapUtil;
