//! Login loop and custom-channel entry

use crate::config::Role;
use crate::core::{CycleContext, Flow};
use crate::input::{vk, KeyDirection};
use crate::timing;
use crate::vision::Template;

use super::{Orchestrator, Wait};

impl Orchestrator {
    /// Walk from the main screen to the role branch.
    ///
    /// Returns once the role branch has finished or when a step that has no
    /// recovery (lobby, room name) fails.
    pub(super) fn login_loop(&mut self, ctx: &CycleContext) -> Flow<()> {
        loop {
            log::info!("waiting for the login entry screen");
            let entry = loop {
                let found = self.wait_for(
                    ctx,
                    Wait::new(Template::LoginEntry, timing::LOGIN_ENTRY_WAIT).silent(),
                )?;
                if let Some(found) = found.ready() {
                    break found.location;
                }
                log::warn!("login entry not visible, clicking the main screen again");
                self.wait_for(
                    ctx,
                    Wait::new(Template::MainScreen, timing::MAIN_SCREEN_RECLICK_WAIT).click(),
                )?;
            };

            log::info!("waiting for the login form");
            if self
                .wait_for(ctx, Wait::new(Template::LoginForm, timing::LOGIN_FORM_WAIT))?
                .is_ready()
            {
                success!("login form reached");
                self.enter_password(ctx)?;
                return self.enter_channel(ctx);
            }

            log::warn!("login form did not appear, recovering");
            match entry {
                Some(at) => self.providers.actions.click(at),
                None => {
                    self.wait_for(
                        ctx,
                        Wait::new(Template::LoginEntry, timing::LOGIN_RECOVERY_WAIT).click(),
                    )?;
                }
            }
            ctx.pause(timing::ERROR_DIALOG_SETTLE)?;
            self.wait_for(
                ctx,
                Wait::new(Template::MainScreen, timing::MAIN_SCREEN_RECLICK_WAIT).click(),
            )?;
        }
    }

    fn enter_password(&self, ctx: &CycleContext) -> Flow<()> {
        let password = self.settings().bnet_password;
        if password.is_empty() {
            log::warn!("no battle.net password configured");
            return Ok(());
        }

        loop {
            ctx.pause(timing::PASSWORD_SETTLE)?;
            self.focus(ctx)?;
            log::info!("typing password ({} characters)", password.chars().count());
            self.providers.actions.type_text(&password);
            ctx.pause(timing::FOCUS_SETTLE)?;
            self.providers.actions.tap(vk::RETURN);

            let wrong = self.wait_for(
                ctx,
                Wait::new(Template::WrongPassword, timing::WRONG_PASSWORD_WAIT).silent(),
            )?;
            match wrong.location() {
                Some(at) => {
                    log::warn!("password rejected, typing it again");
                    self.providers.actions.click(at);
                    ctx.pause(timing::ERROR_DIALOG_SETTLE)?;
                }
                None => {
                    success!("password submitted");
                    return Ok(());
                }
            }
        }
    }

    /// Lobby, then the custom channel, then the configured role branch
    fn enter_channel(&mut self, ctx: &CycleContext) -> Flow<()> {
        if !self
            .wait_for(ctx, Wait::new(Template::Lobby, timing::LOBBY_WAIT))?
            .is_ready()
        {
            log::warn!("lobby not reached");
            return Ok(());
        }

        loop {
            self.focus(ctx)?;
            self.providers
                .actions
                .tap_held(vk::letter('C'), timing::KEY_HOLD_LONG);
            if self
                .wait_for(ctx, Wait::new(Template::CustomChannel, timing::CUSTOM_CHANNEL_WAIT))?
                .is_ready()
            {
                break;
            }
            log::warn!("custom channel not reached, pressing C again");
        }
        success!("custom channel reached");

        let settings = self.settings();
        let role = settings.role();
        if role == Role::Freematch {
            return self.freematch_loop(ctx);
        }

        let room_name = settings.room_name.trim();
        if room_name.is_empty() {
            log::warn!("no room name configured");
            return Ok(());
        }
        self.focus(ctx)?;
        self.copy_room_name(ctx, room_name)?;
        self.open_room_list(ctx)?;

        match role {
            Role::Guest => self.guest_loop(ctx),
            _ => self.host_loop(ctx),
        }
    }

    /// Type `name` into the channel search box, select it and copy it
    pub(super) fn copy_room_name(&self, ctx: &CycleContext, name: &str) -> Flow<()> {
        let actions = &self.providers.actions;
        log::info!("typing room name '{}'", name);
        actions.type_text(name);
        ctx.pause(timing::FOCUS_SETTLE)?;

        actions.key(vk::SHIFT, KeyDirection::Down, false);
        for _ in 0..name.chars().count() {
            actions.key(vk::LEFT, KeyDirection::Down, true);
            actions.pause(timing::SELECT_STEP);
            actions.key(vk::LEFT, KeyDirection::Up, true);
            actions.pause(timing::SELECT_STEP);
        }
        actions.key(vk::SHIFT, KeyDirection::Up, false);
        ctx.pause(timing::UI_SETTLE)?;

        actions.chord(&[vk::CONTROL], vk::letter('C'));
        ctx.pause(timing::UI_SETTLE)
    }

    /// Tab, G, then wait for the room list
    pub(super) fn open_room_list(&self, ctx: &CycleContext) -> Flow<bool> {
        self.tap(ctx, vk::TAB)?;
        self.tap(ctx, vk::letter('G'))?;
        Ok(self
            .wait_for(ctx, Wait::new(Template::RoomList, timing::ROOM_LIST_WAIT))?
            .is_ready())
    }

    /// Press Escape until the custom channel is visible again
    pub(super) fn escape_to_channel(&self, ctx: &CycleContext) -> Flow<()> {
        loop {
            self.providers.actions.tap(vk::ESCAPE);
            if self
                .wait_for(ctx, Wait::new(Template::CustomChannel, timing::CUSTOM_CHANNEL_WAIT))?
                .is_ready()
            {
                return Ok(());
            }
            log::warn!("custom channel not visible, pressing Escape again");
        }
    }
}
