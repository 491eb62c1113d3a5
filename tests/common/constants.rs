#![allow(dead_code)]

pub const USER_1_NAME: &str = "Ada Lovelace";
pub const USER_2_NAME: &str = "Grace Hopper";

pub const WORK_ORDER_1_TITLE: &str = "Replace boiler valve";
pub const WORK_ORDER_2_TITLE: &str = "Inspect \"main\" panel, east wing";
pub const WORK_ORDER_3_TITLE: &str = "Paint stairwell";

pub const WORK_ORDER_1_NOTES: &str = "Bring the 22mm spanner.\nTenant works nights.";

pub const MAIL_FROM: &str = "backup@workdesk.test";
pub const MAIL_TO: &str = "ops@workdesk.test";

pub const TEST_RETENTION_DAYS: u64 = 30;
