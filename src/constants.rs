use std::time::Duration;

pub const PORTAL_BASE_URL: &str = "http://samad.aut.ac.ir";
pub const LOGIN_PAGE_PATH: &str = "/loginpage.rose";
pub const LOGIN_ACTION_PATH: &str = "/j_security_check";
pub const CAPTCHA_PATH: &str = "/captcha.jpg";
pub const RESERVATION_PATH: &str = "/nurture/user/multi/reserve/reserve.rose";

pub const CSRF_HEADER: &str = "X-Csrf-Token";
pub const CSRF_FIELD: &str = "_csrf";
pub const REMAIN_CREDIT_FIELD: &str = "remainCredit";
pub const SHOW_NEXT_WEEK_FIELD: &str = "method:showNextWeek";
pub const DO_RESERVE_FIELD: &str = "method:doReserve";
pub const SUBMIT_VALUE: &str = "Submit";
/// value the portal's own script puts into an enabled option select
pub const DEFAULT_OPTION_VALUE: &str = "1";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);
pub const SAMAD_DB: &str = "samad.sqlite";

pub const NO_DB_MSG: &str = "Please /register your student id and password first.";
pub const ERROR_MSG: &str = "Something went wrong, please try again.";
pub const WELCOME_MSG: &str = "Hi! I can reserve your meals on Samad.\n\n\
/register - save student id and password\n\
/menu - meals of this and next week\n\
/credit - remaining credit\n\
/forget - delete saved credentials";
pub const ENTER_STUDENT_ID_MSG: &str = "Please send your student id:";
pub const ENTER_PASSWORD_MSG: &str = "Please send your Samad password:";
pub const PROFILE_SAVED_MSG: &str = "Saved! Try /menu.";
pub const PROFILE_DELETED_MSG: &str = "Your credentials were deleted.";
pub const TOGGLE_SUCCESS_MSG: &str = "Done ✅";
pub const NOT_RESERVABLE_MSG: &str = "This meal can't be changed anymore.";
pub const NOT_FOUND_MSG: &str = "This meal is not on the menu anymore, please open /menu again.";
pub const LOGIN_FAILED_MSG: &str =
    "Login failed. Either the captcha was misread or your credentials are wrong, please retry or /register again.";
