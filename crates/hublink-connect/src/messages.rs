//! User-facing strings

pub const CONNECTING_TO_SERVER: &str = "Connecting to JupyterHub Server";
pub const STARTING_SERVER: &str = "Starting Server";
pub const LABEL_OF_COMMAND_TO_ENTER_URL: &str = "Enter the URL of the running JupyterHub Server...";
pub const TITLE_OF_INPUT_BOX_TO_ENTER_URL: &str = "Enter the URL of the running JupyterHub Server";
pub const PLACEHOLDER_OF_INPUT_BOX_TO_ENTER_URL: &str = "Enter the URL of the running JupyterHub Server";
pub const CAPTURE_USERNAME_TITLE: &str = "Enter your username";
pub const CAPTURE_USERNAME_PROMPT: &str = "username";
pub const CAPTURE_PASSWORD_TITLE: &str = "Enter your password or API token";
pub const CAPTURE_PASSWORD_PROMPT: &str = "password or token";
pub const CAPTURE_API_TOKEN_TITLE: &str = "Enter your API token";
pub const CAPTURE_API_TOKEN_PROMPT: &str = "API token";
pub const USERNAME_PASSWORD_AUTH_FAILURE: &str = "Invalid username or password.";
pub const SELF_CERT_FAIL_ERROR_MESSAGE_ONLY: &str = "The security certificate used by server was not issued by a trusted certificate authority.\r\nThis may indicate an attempt to steal your information.";
pub const SELF_CERT_EXPIRED_ERROR_MESSAGE_ONLY: &str =
    "The security certificate used by server has expired.\r\nThis may indicate an attempt to steal your information.";
pub const SELF_CERT_ENABLE: &str = "Yes, connect anyway";
pub const SELF_CERT_CLOSE: &str = "No, close the connection";
pub const INVALID_URL: &str = "Invalid URL specified";
pub const INVALID_JUPYTER_HUB_URL: &str = "Invalid JupyterHub URL specified";
pub const RENAME_SERVER: &str = "Change server name";
pub const EMPTY_USERNAME: &str = "Username cannot be empty";
pub const EMPTY_PASSWORD: &str = "Password/API token cannot be empty";
pub const EMPTY_API_TOKEN: &str = "API token cannot be empty";

pub fn self_cert_prompt(error_message: &str) -> String {
    format!(
        "The security certificate used by server {} was not issued by a trusted certificate authority.\r\n\
         This may indicate an attempt to steal your information.\r\n\
         Do you want to enable the Allow Unauthorized Remote Connection setting for this workspace to allow you to connect?",
        error_message
    )
}

pub fn expired_cert_prompt(error_message: &str) -> String {
    format!(
        "The security certificate used by server {} has expired.\r\n\
         This may indicate an attempt to steal your information.\r\n\
         Do you want to enable the Allow Unauthorized Remote Connection setting for this workspace to allow you to connect?",
        error_message
    )
}

pub fn connect_to_server(url: &str) -> String {
    format!("Connect to the JupyterHub server {}", url)
}

pub fn connection_failed_with_error(error_message: &str) -> String {
    format!(
        "Connection failure. Verify the server is running and reachable. ({}).",
        error_message
    )
}
