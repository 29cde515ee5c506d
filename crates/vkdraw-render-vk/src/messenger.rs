// SPDX-License-Identifier: CEPL-1.0
use ash::ext::debug_utils;
use ash::{vk, Entry};
use std::borrow::Cow;
use std::ffi::CStr;
use tracing::Level;

pub(crate) fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::INFO
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback struct for the duration of the call.
    let data = unsafe { &*data };
    let message = if data.p_message.is_null() {
        Cow::from("")
    } else {
        // SAFETY: non-null, nul-terminated per the extension contract.
        unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
    };

    match severity_level(severity) {
        Level::ERROR => tracing::error!(target: "vulkan", "{types:?}: {message}"),
        Level::WARN => tracing::warn!(target: "vulkan", "{types:?}: {message}"),
        Level::INFO => tracing::info!(target: "vulkan", "{types:?}: {message}"),
        Level::DEBUG => tracing::debug!(target: "vulkan", "{types:?}: {message}"),
        _ => tracing::trace!(target: "vulkan", "{types:?}: {message}"),
    }
    vk::FALSE
}

pub(crate) fn create_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT), vk::Result> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    // SAFETY: the instance was created with VK_EXT_debug_utils enabled.
    let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None) }?;
    Ok((loader, messenger))
}
