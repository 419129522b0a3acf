use chrono::{Duration, NaiveDateTime};

use crate::config::{ConfigError, ServiceLogin};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECTION_RULE: &str = "============================================================";
const CREDS_FALLBACK: &str = " (check environment variables)";

/// Fields interpolated into the workflow instruction. Adjust these to point
/// the agent at different services or a different action.
#[derive(Clone, Debug)]
pub struct WorkflowParams {
    pub email_service: String,  // name of the email service
    pub email_url: String,      // URL to navigate to
    pub email_bookmark: String, // browser bookmark name, if any
    pub payment_service: String,
    pub payment_url: String,
    pub payment_bookmark: String,
    pub action_name: String, // button/menu text to click
    pub action_menu: String, // how to reach the action, e.g. "three dots"
    pub search_keywords: Vec<String>,
    pub hours_lookback: i64, // only process requests from the last N hours
}

impl Default for WorkflowParams {
    fn default() -> Self {
        Self {
            email_service: "Zoho Mail".into(),
            email_url: "mail.zoho.com".into(),
            email_bookmark: "Zoho Mail".into(),
            payment_service: "Stripe".into(),
            payment_url: "dashboard.stripe.com".into(),
            payment_bookmark: "Stripe".into(),
            action_name: "Refund payment".into(),
            action_menu: "three dots".into(),
            search_keywords: Vec::new(),
            hours_lookback: 24,
        }
    }
}

impl WorkflowParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hours_lookback <= 0 {
            return Err(ConfigError::Invalid(
                "hours_lookback must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn creds_block(login: &ServiceLogin) -> String {
    match login.pair() {
        Some((email, password)) => {
            format!("\n   - Email: {email}\n   - Password: {password}")
        }
        None => CREDS_FALLBACK.to_string(),
    }
}

/// Render the full instruction handed to the hosted agent loop. Pure: the
/// same parameters, logins, `now` and `dry_run` always produce the same
/// string, with nothing left for the receiver to interpolate.
pub fn build_prompt(
    params: &WorkflowParams,
    email_login: &ServiceLogin,
    payment_login: &ServiceLogin,
    now: NaiveDateTime,
    dry_run: bool,
) -> String {
    let current_time = now.format(TIME_FORMAT).to_string();
    let lookback_time = (now - Duration::hours(params.hours_lookback))
        .format(TIME_FORMAT)
        .to_string();
    let keywords = params.search_keywords.join(", ");
    let email_creds = creds_block(email_login);
    let payment_creds = creds_block(payment_login);

    // A multi-line literal keeps the stage indentation byte-exact.
    let mut prompt = format!(
        "You are an automation agent tasked with processing requests.
Current time: {current_time}
Only process requests from the last {hours} hours (since {lookback_time}).

{rule}
WORKFLOW STEPS
{rule}

1. OPEN BROWSER
   - Open Firefox browser (if not already open)
   - Look for bookmarks for \"{email_bookmark}\" and \"{payment_bookmark}\"
   - If bookmarks exist, you can use them for faster navigation

2. GO TO EMAIL ({email_service})
   - Navigate to: {email_url}
   - Check if you're already logged in (look for inbox, profile icon, etc.)
   - If NOT logged in, use these credentials:{email_creds}
   - Verify you're in the correct account

3. SEARCH FOR REQUESTS
   - Search for emails containing: {keywords}
   - CRITICAL: Just type the search term and press Enter
   - CRITICAL: Do NOT click dropdown suggestions that appear while typing
   - CRITICAL: Only process emails from the last {hours} hours
   - If no matching emails found, the task is complete - log \"No requests found\" and finish

4. FOR EACH REQUEST FOUND (process one at a time):

   a. EXTRACT INFORMATION
      - Open the email
      - Find the customer's email address (usually in \"From\" field or email body)
      - Note any specific details mentioned (amounts, order numbers, etc.)

   b. GO TO PAYMENT SERVICE ({payment_service})
      - Navigate to: {payment_url}
      - Log in if needed using:{payment_creds}
      - Verify you're logged in

   c. FIND THE CUSTOMER
      - Go to the Payments or Customers section
      - Search for the customer by their email address
      - Wait for results to load
      - Verify you found the correct customer (email must match exactly)

   d. PERFORM THE ACTION
      - Find the relevant transaction/payment
      - Click the {action_menu} menu (usually \u{22ef} or ...)
      - Click \"{action_name}\"
      - Confirm the action if prompted
      - Wait for success confirmation
      - Take a screenshot to document the action

   e. RETURN TO EMAIL
      - Go back to {email_service}
      - Process the next request

5. COMPLETION
   - After all requests are processed, take a final screenshot
   - Log a summary of actions taken
   - Your task is complete

{rule}
IMPORTANT RULES
{rule}

- Process requests ONE AT A TIME (not in parallel)
- Take screenshots after important steps for verification
- If you encounter an error, take a screenshot and try to recover
- If a customer is not found, skip and move to the next request
- If an action was already performed, skip and move to the next
- Be careful and methodical - accuracy over speed
",
        hours = params.hours_lookback,
        rule = SECTION_RULE,
        email_bookmark = params.email_bookmark,
        payment_bookmark = params.payment_bookmark,
        email_service = params.email_service,
        email_url = params.email_url,
        payment_service = params.payment_service,
        payment_url = params.payment_url,
        action_menu = params.action_menu,
        action_name = params.action_name,
    );

    if dry_run {
        prompt.push_str(
            "\n[DRY RUN MODE] Do NOT actually click action buttons. \
Instead, take screenshots and describe what you would do.\n",
        );
    }
    prompt.push_str("\nBegin by opening the browser and starting the workflow.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn params() -> WorkflowParams {
        WorkflowParams {
            search_keywords: vec!["refund".into(), "refund request".into()],
            ..WorkflowParams::default()
        }
    }

    #[test]
    fn prompt_is_deterministic() {
        let p = params();
        let a = build_prompt(&p, &ServiceLogin::default(), &ServiceLogin::default(), fixed_now(), false);
        let b = build_prompt(&p, &ServiceLogin::default(), &ServiceLogin::default(), fixed_now(), false);
        assert_eq!(a, b);
    }

    #[test]
    fn lookback_boundary_matches_now_minus_hours() {
        let prompt = build_prompt(
            &params(),
            &ServiceLogin::default(),
            &ServiceLogin::default(),
            fixed_now(),
            false,
        );
        assert!(prompt.contains("Current time: 2024-01-02 10:00:00"));
        assert!(prompt.contains("last 24 hours (since 2024-01-01 10:00:00)"));
    }

    #[test]
    fn keywords_join_verbatim() {
        let prompt = build_prompt(
            &params(),
            &ServiceLogin::default(),
            &ServiceLogin::default(),
            fixed_now(),
            false,
        );
        assert!(prompt.contains("Search for emails containing: refund, refund request"));
    }

    #[test]
    fn complete_login_pair_is_embedded_literally() {
        let email_login = ServiceLogin {
            email: Some("ops@example.com".into()),
            password: Some("hunter2".into()),
        };
        let prompt = build_prompt(
            &params(),
            &email_login,
            &ServiceLogin::default(),
            fixed_now(),
            false,
        );
        assert!(prompt.contains("- Email: ops@example.com"));
        assert!(prompt.contains("- Password: hunter2"));
    }

    #[test]
    fn incomplete_pair_falls_back_without_leaking() {
        let half = ServiceLogin {
            email: Some("ops@example.com".into()),
            password: None,
        };
        let prompt = build_prompt(&params(), &half, &ServiceLogin::default(), fixed_now(), false);
        assert!(prompt.contains("use these credentials: (check environment variables)"));
        assert!(!prompt.contains("ops@example.com"));
    }

    #[test]
    fn dry_run_directive_toggles() {
        let p = params();
        let live = build_prompt(&p, &ServiceLogin::default(), &ServiceLogin::default(), fixed_now(), false);
        let dry = build_prompt(&p, &ServiceLogin::default(), &ServiceLogin::default(), fixed_now(), true);
        assert!(!live.contains("[DRY RUN MODE]"));
        assert!(dry.contains("[DRY RUN MODE] Do NOT actually click action buttons."));
        assert!(dry.ends_with("Begin by opening the browser and starting the workflow."));
    }

    #[test]
    fn zero_lookback_is_rejected() {
        let p = WorkflowParams {
            hours_lookback: 0,
            ..WorkflowParams::default()
        };
        assert!(p.validate().is_err());
        assert!(params().validate().is_ok());
    }
}
