/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Maps the warehouse roles to the screens they may open. The server remains
 * the authority; this table only decides what the client offers.
 */

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use strum::IntoEnumIterator;
use tracing::warn;

use super::Actor;
use crate::errors::ServiceError;

/// Roles issued by the authentication service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    WarehouseStaff,
    DepartmentUser,
    HeadOfWarehouse,
}

/// Screens of the application shell.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Screen {
    Dashboard,
    Items,
    Categories,
    Suppliers,
    IncomingGoods,
    OutgoingGoods,
    PurchaseOrders,
    Users,
    ItemRequests,
    Approvals,
    StockMovements,
    Reports,
}

lazy_static! {
    static ref SCREEN_ROLES: HashMap<Screen, HashSet<Role>> = {
        use Role::*;
        let mut screens: HashMap<Screen, HashSet<Role>> = HashMap::new();

        // Every authenticated user lands on the dashboard
        screens.insert(Screen::Dashboard, Role::iter().collect());

        // Master data and stock transactions
        for screen in [
            Screen::Items,
            Screen::Categories,
            Screen::Suppliers,
            Screen::IncomingGoods,
            Screen::OutgoingGoods,
            Screen::PurchaseOrders,
        ] {
            screens.insert(screen, HashSet::from([Admin, WarehouseStaff]));
        }

        screens.insert(Screen::Users, HashSet::from([Admin]));
        screens.insert(
            Screen::ItemRequests,
            HashSet::from([Admin, WarehouseStaff, DepartmentUser]),
        );
        screens.insert(Screen::Approvals, HashSet::from([HeadOfWarehouse]));

        for screen in [Screen::StockMovements, Screen::Reports] {
            screens.insert(screen, HashSet::from([Admin, WarehouseStaff, HeadOfWarehouse]));
        }

        screens
    };
}

impl Role {
    pub fn can_access(self, screen: Screen) -> bool {
        SCREEN_ROLES
            .get(&screen)
            .map(|roles| roles.contains(&self))
            .unwrap_or(false)
    }

    /// Screens this role may open, in navigation order.
    pub fn screens(self) -> Vec<Screen> {
        Screen::iter().filter(|s| self.can_access(*s)).collect()
    }
}

/// Rejects actors whose role may not open `screen`.
pub fn authorize(actor: &Actor, screen: Screen) -> Result<(), ServiceError> {
    if actor.role.can_access(screen) {
        return Ok(());
    }
    warn!(user_id = %actor.id, role = %actor.role, screen = %screen, "screen access denied");
    Err(ServiceError::Forbidden(format!(
        "role {} may not open {}",
        actor.role, screen
    )))
}
