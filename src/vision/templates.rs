//! Named reference images
//!
//! File names are fixed by the template directory shipped with the client
//! profile; the enum only gives them stable identities.

use std::fmt;

use crate::config::Character;

/// Every template the orchestrator knows how to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    // Login and rooms
    MainScreen,
    LoginEntry,
    LoginForm,
    Lobby,
    CustomChannel,
    WrongPassword,
    RoomList,
    RoomEnter,
    RoomCreate,
    LoadingDone,
    LoadingTimeout,
    LoadingCursor,
    InGame,

    // Character select and loading
    Portrait(Character),
    CharacterSelected,
    UnitGroup,
    Attendance,

    // Auto-hunt dialog
    HuntStay,
    HuntDialog,
    HuntStayOff,
    HuntDialogConfirm,

    // Command card
    Move,
    MoveX,
    Stop,
    Attack,
    AttackX,
    PortalCheck,
    HoldCheck,
    HuntOn,

    // Session end
    MissionEnd,
    PlayerLeft,
}

impl Template {
    /// File name inside the template directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Template::MainScreen => "1.메인화면.png",
            Template::LoginEntry => "2.로그인화면입장감지.png",
            Template::LoginForm => "3.로그인화면.png",
            Template::Lobby => "4.로비체크.png",
            Template::CustomChannel => "5.커스텀채널입장.png",
            Template::WrongPassword => "6.로그인비밀번호틀렸을때.png",
            Template::RoomList => "7.방목록입장.png",
            Template::RoomEnter => "8.방입장체크(동맹).png",
            Template::RoomCreate => "9.방만들기(방장만).png",
            Template::LoadingDone => "11.로딩완료.png",
            Template::LoadingTimeout => "12.인원수타임아웃강제시작.png",
            Template::LoadingCursor => "13.로딩완료후커서이동.png",
            Template::InGame => "14.인게임체크.png",
            Template::Portrait(character) => match character {
                Character::SwordSaint => "15.검성.png",
                Character::Templar => "16.템플러.png",
                Character::Hunter => "17.사냥꾼.png",
                Character::Mage => "18.마도사.png",
                Character::Lancer => "19.창술사.png",
                Character::Swordsman => "20.검객.png",
            },
            Template::CharacterSelected => "21.캐릭터선택체크.png",
            Template::UnitGroup => "22.부대지정체크.png",
            Template::Attendance => "23.출석체크.png",
            Template::HuntStay => "24.제자리사냥.png",
            Template::HuntDialog => "26.자동사냥다이얼로그.png",
            Template::HuntStayOff => "27.제자리OFF.png",
            Template::HuntDialogConfirm => "28.자동사냥다이얼로그컨펌버튼.png",
            Template::Move => "29.이동.png",
            Template::MoveX => "30.이동(X).png",
            Template::Stop => "31.정지.png",
            Template::Attack => "33.공격.png",
            Template::AttackX => "34.공격(x).png",
            Template::PortalCheck => "35.포탈검증.png",
            Template::HoldCheck => "36.홀드검증.png",
            Template::HuntOn => "37.자동사냥ON검증.png",
            Template::MissionEnd => "41.미션종료.png",
            Template::PlayerLeft => "42.플레이어나감인식.png",
        }
    }

    /// Whether the template is matched through its alpha mask
    pub fn uses_mask(&self) -> bool {
        matches!(self, Template::MissionEnd | Template::PlayerLeft)
    }

    /// Whether the template is always matched on edges
    pub fn prefers_edges(&self) -> bool {
        false
    }

    /// Preferred pre-cut variant (`<stem>_masked.png`) of a masked template
    pub fn masked_file_name(&self) -> Option<String> {
        if !self.uses_mask() {
            return None;
        }
        let name = self.file_name();
        let stem = name.strip_suffix(".png").unwrap_or(name);
        Some(format!("{stem}_masked.png"))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_variant_only_for_masked_templates() {
        assert_eq!(
            Template::PlayerLeft.masked_file_name().as_deref(),
            Some("42.플레이어나감인식_masked.png")
        );
        assert_eq!(Template::Attack.masked_file_name(), None);
    }

    #[test]
    fn test_portrait_file_names_are_distinct() {
        let names: std::collections::HashSet<_> = Character::ALL
            .iter()
            .map(|c| Template::Portrait(*c).file_name())
            .collect();
        assert_eq!(names.len(), Character::ALL.len());
    }
}
