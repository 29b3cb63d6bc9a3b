use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, FixedOffset};
use samad_telegram_rs::{
    data_types::samad_data_types::{Credentials, MealStatus, MealTime},
    errors::{AuthError, CaptchaError, SelfServiceError},
    selfservice::{
        calendar::{meal_date, parse_jalali_date},
        get_available_foods, get_credit, login, toggle_food_reservation, CaptchaSolver,
        PortalConfig, Session,
    },
    session_cache::SessionCache,
};

const CAPTCHA_ANSWER: &str = "12345";
const USER: &str = "9531001";
const PASSWORD: &str = "secret";
const LOGIN_ERROR: &str = "کد امنیتی یا رمز عبور اشتباه است";
const CREDIT_ERROR: &str = "اعتبار شما کافی نیست";

#[derive(Clone)]
struct MockMeal {
    date: &'static str,
    slot: usize,
    name: &'static str,
    price: i64,
    reserved: bool,
    locked: bool,
}

fn mock_meal(date: &'static str, slot: usize, name: &'static str, price: i64) -> MockMeal {
    MockMeal {
        date,
        slot,
        name,
        price,
        reserved: false,
        locked: false,
    }
}

#[derive(Default)]
struct Visitor {
    authenticated: bool,
    token: String,
    week: usize,
}

struct PortalState {
    visitors: HashMap<String, Visitor>,
    counter: u64,
    credit: i64,
    weeks: [Vec<MockMeal>; 2],
    logins: usize,
    writes: usize,
    last_remain_credit: Option<String>,
}

type Shared = Arc<Mutex<PortalState>>;

impl PortalState {
    fn new() -> Self {
        let current = vec![
            MockMeal {
                reserved: true,
                locked: true,
                ..mock_meal("1396/07/29", 1, "چلو کباب", 5500)
            },
            mock_meal("1396/08/01", 1, "زرشک پلو با مرغ", 6000),
            MockMeal {
                reserved: true,
                ..mock_meal("1396/08/01", 2, "کوکو سبزی", 3500)
            },
            mock_meal("1396/08/03", 2, "عدس پلو", 4000),
        ];
        let next = vec![
            mock_meal("1396/08/03", 2, "آش رشته", 7000),
            mock_meal("1396/08/06", 1, "قیمه", 5500),
            MockMeal {
                locked: true,
                ..mock_meal("1396/08/07", 1, "ماکارونی", 5000)
            },
        ];

        PortalState {
            visitors: HashMap::new(),
            counter: 0,
            credit: 20000,
            weeks: [current, next],
            logins: 0,
            writes: 0,
            last_remain_credit: None,
        }
    }

    fn next_token(&mut self, sid: &str) -> String {
        self.counter += 1;
        let token = format!("tok-{}", self.counter);
        if let Some(visitor) = self.visitors.get_mut(sid) {
            visitor.token = token.clone();
        }
        token
    }

    /// sid of a logged in visitor that sent its current token
    fn authorize(&self, headers: &HeaderMap) -> Option<String> {
        let sid = session_id(headers)?;
        let visitor = self.visitors.get(&sid)?;
        let header_token = headers.get("x-csrf-token")?.to_str().ok()?;

        (visitor.authenticated && visitor.token == header_token).then_some(sid)
    }

    fn apply_reservation(
        &mut self,
        week: usize,
        form: &HashMap<String, String>,
    ) -> Option<&'static str> {
        let mut cost = 0;
        let mut changes = Vec::new();
        for (i, meal) in self.weeks[week].iter().enumerate() {
            if meal.locked {
                continue;
            }
            let selected = form
                .get(&format!("userWeekReserves[{}].selected", i))
                .map(String::as_str)
                == Some("true");
            if selected != meal.reserved {
                cost += if selected { meal.price } else { -meal.price };
                changes.push((i, selected));
            }
        }

        if self.credit < cost {
            return Some(CREDIT_ERROR);
        }
        self.credit -= cost;
        for (i, selected) in changes {
            self.weeks[week][i].reserved = selected;
        }
        self.writes += 1;
        None
    }

    fn render_week(&self, week: usize, token: &str, error: Option<&str>) -> String {
        let mut rows = String::new();
        for (i, meal) in self.weeks[week].iter().enumerate() {
            let mut cells = String::new();
            for slot in 0..3 {
                if slot != meal.slot {
                    cells += r#"<td class="mealCell"><table align="center"></table></td>"#;
                    continue;
                }
                let checked = if meal.reserved { r#" checked="checked""# } else { "" };
                let disabled = if meal.locked { r#" disabled="disabled""# } else { "" };
                let count = if meal.reserved { 1 } else { 0 };
                cells += &format!(
                    r#"<td class="mealCell"><table align="center"><tr>
                    <td class="foodCell">
                        <input type="checkbox" id="userWeekReserves{i}" name="userWeekReserves[{i}].selected"{checked}{disabled}/>
                        <span>{code} | {name} | ماست</span>
                        <div>{price} ریال</div>
                    </td>
                    <td class="countCell">
                        <input type="hidden" name="userWeekReserves[{i}].selectedCount" value="{count}"/>
                        <select name="userWeekReserves[{i}].selectedCountSelect"><option value="1">1</option></select>
                        <input type="hidden" name="userWeekReserves[{i}].id" value="{program}"/>
                    </td>
                    </tr></table></td>"#,
                    i = i,
                    checked = checked,
                    disabled = disabled,
                    code = 100 + i,
                    name = meal.name,
                    price = meal.price,
                    count = count,
                    program = 900 + week * 10 + i,
                );
            }
            rows += &format!(
                r#"<tr><td valign="middle"><div>{}</div><div>-</div></td>{}</tr>"#,
                meal.date, cells
            );
        }

        format!(
            r#"<html><head><script>$.ajaxSetup({{ headers: {{ 'X-CSRF-TOKEN' : '{token}' }} }});</script></head>
            <body>
            <span id="creditId">{credit}</span>
            <div id="errorMessages">{error}</div>
            <form method="post" action="/nurture/user/multi/reserve/reserve.rose">
            <input type="hidden" name="_csrf" value="{token}"/>
            <input type="hidden" name="remainCredit" value="{credit}"/>
            <input type="hidden" name="weekStartDateTime" value="{week}"/>
            <table>{rows}</table>
            <input type="submit" name="method:showNextWeek" value="next"/>
            <input type="submit" name="method:doReserve" value="save"/>
            </form></body></html>"#,
            token = token,
            credit = self.credit,
            error = error.unwrap_or_default(),
            week = week,
            rows = rows,
        )
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split("; ")
        .find_map(|cookie| cookie.strip_prefix("JSESSIONID="))
        .map(str::to_string)
}

fn login_html(token: &str, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<div class="alert-danger">{}</div>"#, e))
        .unwrap_or_default();
    format!(
        r#"<html><head><script>headers: {{ 'X-CSRF-TOKEN' : '{}' }}</script></head><body>
        {}
        <form action="/j_security_check" method="post">
            <input type="text" name="username"/>
            <input type="password" name="password"/>
            <img src="/captcha.jpg"/>
            <input type="text" name="captcha_input"/>
        </form></body></html>"#,
        token, error
    )
}

async fn login_page(State(state): State<Shared>) -> Response {
    let mut state = state.lock().unwrap();
    state.counter += 1;
    let sid = format!("sid{}", state.counter);
    state.visitors.insert(sid.clone(), Visitor::default());
    let token = state.next_token(&sid);

    (
        [(header::SET_COOKIE, format!("JSESSIONID={}; Path=/", sid))],
        Html(login_html(&token, None)),
    )
        .into_response()
}

async fn broken_login_page() -> Html<&'static str> {
    Html("<html><body>maintenance</body></html>")
}

async fn captcha(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let known = session_id(&headers).is_some_and(|sid| state.lock().unwrap().visitors.contains_key(&sid));
    if !known {
        return StatusCode::FORBIDDEN.into_response();
    }

    let mut png = Vec::new();
    image::RgbImage::new(60, 20)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    ([(header::CONTENT_TYPE, "image/png")], png).into_response()
}

async fn login_action(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let Some(sid) = session_id(&headers) else {
        return StatusCode::FORBIDDEN.into_response();
    };
    let Some(visitor) = state.visitors.get(&sid) else {
        return StatusCode::FORBIDDEN.into_response();
    };
    let header_token = headers.get("x-csrf-token").and_then(|v| v.to_str().ok());
    if form.get("_csrf") != Some(&visitor.token) || header_token != Some(visitor.token.as_str()) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let field = |name: &str| form.get(name).map(String::as_str);
    let accepted = field("captcha_input") == Some(CAPTCHA_ANSWER)
        && field("username") == Some(USER)
        && field("password") == Some(PASSWORD);

    let token = state.next_token(&sid);
    if !accepted {
        return Html(login_html(&token, Some(LOGIN_ERROR))).into_response();
    }

    state.logins += 1;
    if let Some(visitor) = state.visitors.get_mut(&sid) {
        visitor.authenticated = true;
    }
    Html(format!(
        r#"<html><head><script>headers: {{ 'X-CSRF-TOKEN' : '{}' }}</script></head><body>welcome</body></html>"#,
        token
    ))
    .into_response()
}

async fn reserve_page(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    let Some(sid) = state.authorize(&headers) else {
        return StatusCode::FORBIDDEN.into_response();
    };

    let token = state.next_token(&sid);
    if let Some(visitor) = state.visitors.get_mut(&sid) {
        visitor.week = 0;
    }
    Html(state.render_week(0, &token, None)).into_response()
}

async fn reserve_post(
    State(state): State<Shared>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let Some(sid) = state.authorize(&headers) else {
        return StatusCode::FORBIDDEN.into_response();
    };
    let Some(week) = state
        .visitors
        .get(&sid)
        .filter(|visitor| form.get("_csrf") == Some(&visitor.token))
        .map(|visitor| visitor.week)
    else {
        return StatusCode::FORBIDDEN.into_response();
    };

    let (week, error) = if form.contains_key("method:showNextWeek") {
        (1, None)
    } else if form.contains_key("method:doReserve") {
        state.last_remain_credit = form.get("remainCredit").cloned();
        (week, state.apply_reservation(week, &form))
    } else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let token = state.next_token(&sid);
    if let Some(visitor) = state.visitors.get_mut(&sid) {
        visitor.week = week;
    }
    Html(state.render_week(week, &token, error)).into_response()
}

async fn spawn_portal(state: PortalState) -> (PortalConfig, Shared) {
    let state = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/loginpage.rose", get(login_page))
        .route("/broken-login", get(broken_login_page))
        .route("/captcha.jpg", get(captcha))
        .route("/j_security_check", axum::routing::post(login_action))
        .route(
            "/nurture/user/multi/reserve/reserve.rose",
            get(reserve_page).post(reserve_post),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let portal = PortalConfig::with_base_url(&format!("http://{}", addr))
        .timeout(Duration::from_secs(5));
    (portal, state)
}

struct StubSolver(&'static str);

impl CaptchaSolver for StubSolver {
    fn solve(&self, image: &[u8]) -> Result<String, CaptchaError> {
        assert!(!image.is_empty());
        Ok(format!(" {}\n", self.0))
    }
}

fn solver() -> Arc<dyn CaptchaSolver> {
    Arc::new(StubSolver(CAPTCHA_ANSWER))
}

fn at(jalali: &str, meal_time: MealTime) -> DateTime<FixedOffset> {
    meal_date(parse_jalali_date(jalali).unwrap(), meal_time).unwrap()
}

async fn logged_in(portal: &PortalConfig) -> Session {
    login(portal, solver(), USER, PASSWORD).await.unwrap()
}

async fn status_of(session: &mut Session, date: DateTime<FixedOffset>, name: &str) -> MealStatus {
    let foods = get_available_foods(session).await.unwrap();
    foods[&date]
        .iter()
        .find(|meal| meal.name == name)
        .map(|meal| meal.status)
        .unwrap()
}

#[tokio::test]
async fn login_keeps_cookie_and_latest_token() {
    let (portal, state) = spawn_portal(PortalState::new()).await;

    let session = logged_in(&portal).await;

    let state = state.lock().unwrap();
    assert_eq!(state.logins, 1);
    let visitor = state.visitors.values().find(|v| v.authenticated).unwrap();
    assert_eq!(session.csrf(), visitor.token);
    assert_eq!(session.username(), USER);
}

#[tokio::test]
async fn wrong_captcha_guess_is_rejected() {
    let (portal, state) = spawn_portal(PortalState::new()).await;

    let err = login(&portal, Arc::new(StubSolver("99999")), USER, PASSWORD)
        .await
        .unwrap_err();

    match err {
        SelfServiceError::Auth(AuthError::LoginRejected(reason)) => {
            assert_eq!(reason, LOGIN_ERROR)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(state.lock().unwrap().logins, 0);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (portal, _state) = spawn_portal(PortalState::new()).await;

    let err = login(&portal, solver(), USER, "hunter2").await.unwrap_err();

    assert!(matches!(
        err,
        SelfServiceError::Auth(AuthError::LoginRejected(_))
    ));
}

#[tokio::test]
async fn login_page_without_token() {
    let (mut portal, _state) = spawn_portal(PortalState::new()).await;
    portal.login_page_url = portal.login_page_url.replace("/loginpage.rose", "/broken-login");

    let err = login(&portal, solver(), USER, PASSWORD).await.unwrap_err();

    assert!(matches!(err, SelfServiceError::Auth(AuthError::MissingCsrf)));
}

#[tokio::test]
async fn missing_login_page_reports_status() {
    let (mut portal, _state) = spawn_portal(PortalState::new()).await;
    portal.login_page_url = portal.login_page_url.replace("/loginpage.rose", "/gone");

    let err = login(&portal, solver(), USER, PASSWORD).await.unwrap_err();

    assert!(matches!(
        err,
        SelfServiceError::Auth(AuthError::LoginPageFailed(404))
    ));
}

#[tokio::test]
async fn credit_is_read_from_reservation_page() {
    let (portal, _state) = spawn_portal(PortalState::new()).await;
    let mut session = logged_in(&portal).await;

    assert_eq!(get_credit(&mut session).await.unwrap(), 20000);
    // again, with the token of the previous page
    assert_eq!(get_credit(&mut session).await.unwrap(), 20000);
}

#[tokio::test]
async fn toggling_twice_restores_credit_and_status() {
    let (portal, state) = spawn_portal(PortalState::new()).await;
    let mut session = logged_in(&portal).await;
    let lunch = at("1396/08/01", MealTime::Lunch);

    let outcome = toggle_food_reservation(&mut session, &lunch, "userWeekReserves1")
        .await
        .unwrap();
    assert!(outcome.toggled);
    assert_eq!(outcome.rejection, None);
    assert_eq!(get_credit(&mut session).await.unwrap(), 14000);
    assert_eq!(
        state.lock().unwrap().last_remain_credit.as_deref(),
        Some("14000")
    );
    assert_eq!(
        status_of(&mut session, lunch, "زرشک پلو با مرغ").await,
        MealStatus::Reserved
    );

    let outcome = toggle_food_reservation(&mut session, &lunch, "userWeekReserves1")
        .await
        .unwrap();
    assert!(outcome.toggled);
    assert_eq!(get_credit(&mut session).await.unwrap(), 20000);
    assert_eq!(
        status_of(&mut session, lunch, "زرشک پلو با مرغ").await,
        MealStatus::Reservable
    );

    let state = state.lock().unwrap();
    assert_eq!(state.writes, 2);
    // the other reservation of that day is untouched
    assert!(state.weeks[0][2].reserved);
}

#[tokio::test]
async fn locked_meal_is_not_written() {
    let (portal, state) = spawn_portal(PortalState::new()).await;
    let mut session = logged_in(&portal).await;

    let outcome = toggle_food_reservation(
        &mut session,
        &at("1396/07/29", MealTime::Lunch),
        "userWeekReserves0",
    )
    .await
    .unwrap();

    assert!(!outcome.toggled);
    assert_eq!(outcome.rejection, None);
    let state = state.lock().unwrap();
    assert_eq!(state.writes, 0);
    assert_eq!(state.credit, 20000);
}

#[tokio::test]
async fn next_week_meal_is_reserved() {
    let (portal, state) = spawn_portal(PortalState::new()).await;
    let mut session = logged_in(&portal).await;

    let outcome = toggle_food_reservation(
        &mut session,
        &at("1396/08/06", MealTime::Lunch),
        "userWeekReserves1",
    )
    .await
    .unwrap();

    assert!(outcome.toggled);
    let state = state.lock().unwrap();
    assert!(state.weeks[1][1].reserved);
    assert!(!state.weeks[0][1].reserved);
    assert_eq!(state.credit, 14500);
}

#[tokio::test]
async fn unknown_meal_is_not_found() {
    let (portal, state) = spawn_portal(PortalState::new()).await;
    let mut session = logged_in(&portal).await;

    // id exists, but not at that time
    let err = toggle_food_reservation(
        &mut session,
        &at("1396/08/02", MealTime::Dinner),
        "userWeekReserves1",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SelfServiceError::MealNotFound { .. }));
    assert_eq!(state.lock().unwrap().writes, 0);
}

#[tokio::test]
async fn portal_rejection_is_surfaced() {
    let mut portal_state = PortalState::new();
    portal_state.credit = 1000;
    let (portal, state) = spawn_portal(portal_state).await;
    let mut session = logged_in(&portal).await;

    let outcome = toggle_food_reservation(
        &mut session,
        &at("1396/08/01", MealTime::Lunch),
        "userWeekReserves1",
    )
    .await
    .unwrap();

    assert!(!outcome.toggled);
    assert_eq!(outcome.rejection.unwrap().message, CREDIT_ERROR);
    let state = state.lock().unwrap();
    assert_eq!(state.writes, 0);
    assert!(!state.weeks[0][1].reserved);
}

#[tokio::test]
async fn merged_listing_prefers_next_week() {
    let (portal, _state) = spawn_portal(PortalState::new()).await;
    let mut session = logged_in(&portal).await;

    let foods = get_available_foods(&mut session).await.unwrap();

    let shared = &foods[&at("1396/08/03", MealTime::Dinner)];
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].name, "آش رشته");
    assert_eq!(shared[0].price, 7000);

    // locked meals of both weeks are left out
    assert!(!foods.contains_key(&at("1396/07/29", MealTime::Lunch)));
    assert!(!foods.contains_key(&at("1396/08/07", MealTime::Lunch)));
    assert_eq!(foods.len(), 4);
    assert_eq!(
        foods[&at("1396/08/01", MealTime::Dinner)][0].status,
        MealStatus::Reserved
    );
}

#[tokio::test]
async fn error_status_is_reported() {
    let (mut portal, _state) = spawn_portal(PortalState::new()).await;
    portal.reservation_url = portal.reservation_url.replace("reserve.rose", "missing.rose");
    let mut session = logged_in(&portal).await;

    let err = get_credit(&mut session).await.unwrap_err();

    assert!(matches!(
        err,
        SelfServiceError::HttpStatus { status: 404, .. }
    ));
}

#[tokio::test]
async fn session_cache_reuses_logins() {
    let (portal, state) = spawn_portal(PortalState::new()).await;
    let cache = SessionCache::new(portal, solver(), Duration::from_secs(600));
    let credentials = Credentials {
        student_id: USER.to_string(),
        password: PASSWORD.to_string(),
    };

    let first = cache.get_or_login(1, &credentials).await.unwrap();
    let second = cache.get_or_login(1, &credentials).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(state.lock().unwrap().logins, 1);

    // changed password means a new login
    let changed = Credentials {
        password: "hunter2".to_string(),
        ..credentials.clone()
    };
    assert!(cache.get_or_login(1, &changed).await.is_err());

    cache.evict(1).await;
    let third = cache.get_or_login(1, &credentials).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(state.lock().unwrap().logins, 2);
    assert_eq!(cache.len().await, 1);

    // still usable through the cache
    assert_eq!(get_credit(&mut *third.lock().await).await.unwrap(), 20000);
}

#[tokio::test]
async fn idle_sessions_are_purged() {
    let (portal, _state) = spawn_portal(PortalState::new()).await;
    let cache = SessionCache::new(portal, solver(), Duration::ZERO);
    let credentials = Credentials {
        student_id: USER.to_string(),
        password: PASSWORD.to_string(),
    };

    cache.get_or_login(7, &credentials).await.unwrap();
    assert_eq!(cache.len().await, 1);

    assert_eq!(cache.purge_expired().await, 1);
    assert!(cache.is_empty().await);
}
