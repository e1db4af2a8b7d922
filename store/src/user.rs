//! User storage trait (only the columns this core owns).

use crate::StoreError;
use ident_types::{TenantId, User, UserId};

pub trait UserStore {
    fn get_user(&self, tenant: &TenantId, id: &UserId) -> Result<User, StoreError>;

    fn put_user(&mut self, user: &User) -> Result<(), StoreError>;
}
