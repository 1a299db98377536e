mod handler;
mod model;

pub use handler::{create_item, delete_item, get_item, list_items, my_items, update_item};
pub use model::{
    CreateItemRequest, Item, ItemCategory, ItemChanges, ItemFilter, ItemWithSeller, ListingType,
    PriceType, UpdateItemRequest, contact_url,
};
