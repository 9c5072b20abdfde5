use onderdelen_scraper::wait::Wait;
use onderdelen_scraper::{BrowserSession, LaunchOptions, PageDriver, ScrapeError, Teardown};
use std::time::Duration;

fn launch() -> BrowserSession {
    BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser")
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_find_read_and_type() {
    let session = launch();
    session
        .navigate("data:text/html,<html><head><title>Zoeken</title></head><body><input id='plate' type='text'><button id='go' disabled>Zoek</button></body></html>")
        .expect("Failed to navigate");

    assert_eq!(session.page_title().unwrap(), "Zoeken");

    let input = session.find_elements("#plate").unwrap().remove(0);
    assert!(session.is_displayed(&input).unwrap());
    session.clear_and_type(&input, "27XHVX").unwrap();
    assert_eq!(session.execute_script("return document.querySelector('#plate').value;", &[]).unwrap(), "27XHVX");

    let button = session.find_elements("#go").unwrap().remove(0);
    assert!(!session.is_enabled(&button).unwrap());
    assert_eq!(session.element_text(&button).unwrap(), "Zoek");
}

#[test]
#[ignore]
fn test_replaced_node_goes_stale() {
    let session = launch();
    session
        .navigate("data:text/html,<html><body><ul id='result-list'><li>1</li></ul><input type='submit' value='>'></body></html>")
        .expect("Failed to navigate");

    let next = session.find_elements("input[type='submit'][value='>']").unwrap().remove(0);
    assert!(!session.is_stale(&next).unwrap());

    session
        .execute_script("document.body.innerHTML = \"<ul id='result-list'><li>2</li></ul>\"; return null;", &[])
        .unwrap();

    Wait::new(Duration::from_secs(2)).for_staleness(&session, &next).unwrap();
    assert!(matches!(session.element_text(&next), Err(ScrapeError::StaleElement(_))));
}

#[test]
#[ignore]
fn test_script_errors_are_not_session_failures() {
    let session = launch();
    session.navigate("data:text/html,<html><body></body></html>").unwrap();

    let err = session.execute_script("throw new Error('boom');", &[]).unwrap_err();
    assert!(matches!(err, ScrapeError::Script(_)));

    let err = session.find_elements("div[[").unwrap_err();
    assert!(matches!(err, ScrapeError::InvalidSelector(_)));
}

#[test]
#[ignore]
fn test_screenshot_and_teardown() {
    let session = launch();
    session.navigate("data:text/html,<html><body><h1>Onderdelen</h1></body></html>").unwrap();

    let png = session.screenshot().unwrap();
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    assert!(session.viewport_size().unwrap().0 > 0);

    session.teardown();
    assert!(session.current_url().unwrap_err().is_session_failure());
    // Idempotent
    session.teardown();
}
